// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use tern_core::AssetPaths;
use tern_math::{Camera, CameraKind, Vec3};
use tern_render::{
    ClientArea, MeshId, RenderTarget, Renderer, RendererDesc, ShaderData, TRIANGLE_INDICES,
    TRIANGLE_VERTICES,
};
use tracing::{debug, error, info};

use crate::attachments::{self, DepthStencil};
use crate::buffer::{Geometry, UniformBuffer};
use crate::context::GraphicsContext;
use crate::descriptors::Descriptors;
use crate::device::{self, Device, DeviceRequest};
use crate::error::{InitError, InitStep, StepExt, VkError, VkResultExt};
use crate::frame::{FrameDevice, FrameOutcome, FrameScheduler};
use crate::handle::DeviceOwned;
use crate::instance::{self, Instance};
use crate::pipeline::{Pipeline, PipelineTarget};
use crate::swapchain::{self, Swapchain};
use crate::sync::FrameSync;
use crate::tools;

/// Explicit Vulkan renderer drawing the demonstration triangle.
///
/// Construction runs the twelve [`InitStep`]s in order and either yields a
/// fully initialized renderer or the first step's error. Fields are declared
/// so that dependents drop before what they depend on.
pub struct VulkanRenderer {
    pipeline: Pipeline,
    descriptors: Descriptors,
    uniforms: Vec<UniformBuffer>,
    geometry: Geometry,
    framebuffers: Vec<DeviceOwned<vk::Framebuffer>>,
    pipeline_cache: DeviceOwned<vk::PipelineCache>,
    depth: DepthStencil,
    sync: FrameSync,
    // freed together with the context's command pool
    command_buffers: Vec<vk::CommandBuffer>,
    swapchain: Swapchain,
    ctx: GraphicsContext,
    scheduler: FrameScheduler,
    camera: Camera,
    clear_color: [f32; 4],
    dynamic_rendering: bool,
    // set while swapchain-sized resources may not match the swapchain
    swapchain_stale: bool,
}

impl VulkanRenderer {
    pub fn init(
        target: &mut dyn RenderTarget,
        desc: &RendererDesc,
        paths: &AssetPaths,
    ) -> Result<Self, InitError> {
        let mut ctx = GraphicsContext::default();

        let display = target
            .display_handle()
            .map(|h| h.as_raw())
            .map_err(VkError::from)
            .step(InitStep::Base)?;
        init_base(&mut ctx, desc, display).step(InitStep::Base)?;
        step_done(InitStep::Base);

        let device = init_device(&mut ctx, desc).step(InitStep::Device)?;
        step_done(InitStep::Device);

        let swapchain = init_swapchain(&mut ctx, &device, target, desc).step(InitStep::Swapchain)?;
        step_done(InitStep::Swapchain);

        let command_buffers =
            allocate_command_buffers(&device, &ctx).step(InitStep::CommandBuffers)?;
        step_done(InitStep::CommandBuffers);

        let sync = FrameSync::new(&device, ctx.max_frames_in_flight, ctx.image_count)
            .step(InitStep::Synchronization)?;
        step_done(InitStep::Synchronization);

        let depth = DepthStencil::new(&device, ctx.extent).step(InitStep::DepthStencil)?;
        step_done(InitStep::DepthStencil);

        let dynamic_rendering = device.dynamic_rendering();
        if dynamic_rendering {
            debug!("dynamic rendering: no render pass");
        } else {
            ctx.render_pass = attachments::create_render_pass(&device, ctx.color_format)
                .step(InitStep::RenderPass)?;
            step_done(InitStep::RenderPass);
        }

        let pipeline_cache =
            attachments::create_pipeline_cache(&device).step(InitStep::Framebuffers)?;
        let framebuffers = if dynamic_rendering {
            Vec::new()
        } else {
            attachments::create_framebuffers(
                &device,
                ctx.render_pass(),
                swapchain.views(),
                depth.view(),
                ctx.extent,
            )
            .step(InitStep::Framebuffers)?
        };
        step_done(InitStep::Framebuffers);

        let geometry = Geometry::upload(&device, &TRIANGLE_VERTICES, &TRIANGLE_INDICES)
            .step(InitStep::Geometry)?;
        step_done(InitStep::Geometry);

        let uniforms = (0..ctx.max_frames_in_flight)
            .map(|_| UniformBuffer::new(&device))
            .collect::<Result<Vec<_>, _>>()
            .step(InitStep::UniformBuffers)?;
        step_done(InitStep::UniformBuffers);

        let descriptors = Descriptors::new(&device, &uniforms).step(InitStep::Descriptors)?;
        step_done(InitStep::Descriptors);

        let pipeline_target = if dynamic_rendering {
            PipelineTarget::Dynamic {
                color: ctx.color_format,
                depth: ctx.depth_format,
            }
        } else {
            PipelineTarget::RenderPass(ctx.render_pass())
        };
        let pipeline = Pipeline::new(
            &device,
            *pipeline_cache,
            descriptors.layout(),
            pipeline_target,
            paths,
        )
        .step(InitStep::Pipeline)?;
        step_done(InitStep::Pipeline);

        let mut camera = Camera::new(CameraKind::LookAt, true);
        camera.set_position(Vec3::new(0.0, 0.0, -2.5));
        camera.set_perspective(
            60.0,
            ctx.extent.width as f32 / ctx.extent.height.max(1) as f32,
            1.0,
            256.0,
        );

        info!(
            "vulkan renderer ready: {}x{}, {} image(s), depth {:?}",
            ctx.extent.width, ctx.extent.height, ctx.image_count, ctx.depth_format
        );

        Ok(Self {
            pipeline,
            descriptors,
            uniforms,
            geometry,
            framebuffers,
            pipeline_cache,
            depth,
            sync,
            command_buffers,
            swapchain,
            scheduler: FrameScheduler::new(ctx.max_frames_in_flight),
            ctx,
            camera,
            clear_color: desc.clear_color,
            dynamic_rendering,
            swapchain_stale: false,
        })
    }

    pub fn context(&self) -> &GraphicsContext {
        &self.ctx
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn current_frame(&self) -> usize {
        self.scheduler.slot()
    }

    /// Rebuilds everything sized by the swapchain. A minimized window is
    /// left alone until it has an area again.
    ///
    /// The renderer stays marked stale until every dependent resource has
    /// been rebuilt, so a failure part way through never leaves frames
    /// recording against framebuffers or semaphores of the old swapchain.
    pub fn recreate_swapchain(&mut self, window: &mut dyn ClientArea) -> Result<(), VkError> {
        if window.client_size().is_empty() {
            debug!("window has no area; swapchain recreation deferred");
            return Ok(());
        }
        let device = self.ctx.device()?.clone();
        device.wait_idle()?;

        // old views are gone once create starts
        self.swapchain_stale = true;
        self.swapchain.create(window)?;
        let extent = self.swapchain.extent();
        let image_count = self.swapchain.image_count();

        let depth = DepthStencil::new(&device, extent)?;
        let framebuffers = if self.dynamic_rendering {
            Vec::new()
        } else {
            attachments::create_framebuffers(
                &device,
                self.ctx.render_pass(),
                self.swapchain.views(),
                depth.view(),
                extent,
            )?
        };
        // render-complete semaphores are per image and the count may change
        let sync = FrameSync::new(&device, self.ctx.max_frames_in_flight, image_count)?;

        self.framebuffers = framebuffers;
        self.depth = depth;
        self.sync = sync;
        self.ctx.extent = extent;
        self.ctx.image_count = image_count;
        self.swapchain_stale = !self.resources_match_swapchain();

        device.wait_idle()?;

        let size = window.client_size();
        if size.width > 0 && size.height > 0 {
            self.camera.update_aspect_ratio(size.aspect());
        }
        Ok(())
    }

    fn resources_match_swapchain(&self) -> bool {
        per_image_resources_match(
            self.swapchain.image_count(),
            self.framebuffers.len(),
            self.sync.images(),
            self.dynamic_rendering,
        )
    }

    fn render_frame(&mut self) -> Result<FrameOutcome, VkError> {
        if self.swapchain_stale || !self.resources_match_swapchain() {
            self.swapchain_stale = true;
            return Ok(FrameOutcome::Recreate);
        }
        let device = self.ctx.device()?.clone();
        let mut frame = FrameResources {
            device: &device,
            swapchain: &self.swapchain,
            sync: &self.sync,
            command_buffers: &self.command_buffers,
            uniforms: &mut self.uniforms,
            shader_data: ShaderData::from_camera(&self.camera),
            framebuffers: &self.framebuffers,
            depth: &self.depth,
            descriptors: &self.descriptors,
            pipeline: &self.pipeline,
            geometry: &self.geometry,
            render_pass: self.ctx.render_pass(),
            extent: self.ctx.extent,
            clear_color: self.clear_color,
            dynamic_rendering: self.dynamic_rendering,
        };
        self.scheduler.render_frame(&mut frame)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Ok(device) = self.ctx.device() {
            if let Err(err) = device.wait_idle() {
                error!("wait for idle before teardown: {err}");
            }
        }
    }
}

impl Renderer for VulkanRenderer {
    fn new(target: &mut dyn RenderTarget, desc: &RendererDesc, paths: &AssetPaths) -> Result<Self> {
        Self::init(target, desc, paths).map_err(|err| {
            error!("{err}");
            err.into()
        })
    }

    fn clear_screen(&mut self, rgba: [f32; 4]) {
        // applied by the next render pass begin
        self.clear_color = rgba;
    }

    fn swap_buffers(&mut self) -> Result<()> {
        // presentation happens inside draw
        Ok(())
    }

    fn create_triangle(&mut self) -> Result<MeshId> {
        // uploaded during construction
        Ok(MeshId::new(0, 0))
    }

    fn draw(&mut self, window: &mut dyn ClientArea, _mesh: MeshId) -> Result<()> {
        if window.client_size().is_empty() {
            return Ok(());
        }
        if self.swapchain_stale {
            self.recreate_swapchain(window)?;
            if self.swapchain_stale {
                return Ok(());
            }
        }
        if self.render_frame()? == FrameOutcome::Recreate {
            self.recreate_swapchain(window)?;
        }
        Ok(())
    }

    fn resize(&mut self, window: &mut dyn ClientArea) -> Result<()> {
        self.recreate_swapchain(window)?;
        Ok(())
    }

    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }
}

/// Framebuffers (render pass path only) and render-complete semaphores are
/// indexed by swapchain image, so each must cover every image.
fn per_image_resources_match(
    image_count: u32,
    framebuffers: usize,
    render_complete: usize,
    dynamic_rendering: bool,
) -> bool {
    let images = image_count as usize;
    let framebuffers_ok = dynamic_rendering || framebuffers == images;
    images > 0 && framebuffers_ok && render_complete == images
}

fn step_done(step: InitStep) {
    debug!("init step '{step}' done");
}

fn init_base(
    ctx: &mut GraphicsContext,
    desc: &RendererDesc,
    display: RawDisplayHandle,
) -> Result<(), VkError> {
    let instance = Instance::new(&desc.app_name, display, desc.validation)?;
    ctx.debug_messenger = instance::create_debug_messenger(&instance)?;
    ctx.physical_device = instance.select_physical_device()?;

    let physical = ctx.physical_device;
    let vki = instance.raw();
    ctx.depth_format = tools::pick_depth_format(|format| unsafe {
        vki.get_physical_device_format_properties(physical, format)
    })?;
    debug!("depth format {:?}", ctx.depth_format);

    ctx.instance = Some(instance);
    Ok(())
}

fn init_device(ctx: &mut GraphicsContext, desc: &RendererDesc) -> Result<Arc<Device>, VkError> {
    let request = DeviceRequest {
        compute_queue: desc.compute_queue,
        transfer_queue: desc.transfer_queue,
        dynamic_rendering: desc.dynamic_rendering,
    };
    let device = Device::new(
        ctx.instance()?.clone(),
        ctx.physical_device,
        ctx.depth_format,
        &request,
    )?;
    ctx.command_pool = device::create_command_pool(
        &device,
        device.families().graphics,
        vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
    )?;
    ctx.device = Some(device.clone());
    Ok(device)
}

fn init_swapchain(
    ctx: &mut GraphicsContext,
    device: &Arc<Device>,
    target: &mut dyn RenderTarget,
    desc: &RendererDesc,
) -> Result<Swapchain, VkError> {
    let surface = swapchain::create_surface(ctx.instance()?, target, desc.platform)?;
    let mut swapchain = Swapchain::new(device.clone(), surface)?;
    swapchain.create(target.client_area_mut())?;

    ctx.color_format = swapchain.color_format();
    ctx.color_space = swapchain.color_space();
    ctx.extent = swapchain.extent();
    ctx.image_count = swapchain.image_count();
    Ok(swapchain)
}

fn allocate_command_buffers(
    device: &Device,
    ctx: &GraphicsContext,
) -> Result<Vec<vk::CommandBuffer>, VkError> {
    let alloc = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: ctx.command_pool()?,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: ctx.max_frames_in_flight as u32,
        ..Default::default()
    };
    unsafe { device.raw().allocate_command_buffers(&alloc) }.call("vkAllocateCommandBuffers")
}

/// Borrowed view of the renderer for one frame.
struct FrameResources<'a> {
    device: &'a Device,
    swapchain: &'a Swapchain,
    sync: &'a FrameSync,
    command_buffers: &'a [vk::CommandBuffer],
    uniforms: &'a mut [UniformBuffer],
    shader_data: ShaderData,
    framebuffers: &'a [DeviceOwned<vk::Framebuffer>],
    depth: &'a DepthStencil,
    descriptors: &'a Descriptors,
    pipeline: &'a Pipeline,
    geometry: &'a Geometry,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    clear_color: [f32; 4],
    dynamic_rendering: bool,
}

impl FrameResources<'_> {
    fn full_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }

    fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ]
    }

    unsafe fn draw_geometry(&self, cmd: vk::CommandBuffer, slot: usize) {
        let vkd = self.device.raw();
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = self.full_area();
        unsafe {
            vkd.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
            vkd.cmd_set_scissor(cmd, 0, std::slice::from_ref(&scissor));
            vkd.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[self.descriptors.set(slot)],
                &[],
            );
            vkd.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.raw());
            vkd.cmd_bind_vertex_buffers(cmd, 0, &[self.geometry.vertex_buffer()], &[0]);
            vkd.cmd_bind_index_buffer(cmd, self.geometry.index_buffer(), 0, vk::IndexType::UINT32);
            vkd.cmd_draw_indexed(cmd, self.geometry.index_count(), 1, 0, 0, 0);
        }
    }

    unsafe fn record_render_pass(&self, cmd: vk::CommandBuffer, slot: usize, image: u32) {
        let clears = self.clear_values();
        let begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.render_pass,
            framebuffer: self.framebuffers[image as usize].raw(),
            render_area: self.full_area(),
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        let vkd = self.device.raw();
        unsafe {
            vkd.cmd_begin_render_pass(cmd, &begin, vk::SubpassContents::INLINE);
            self.draw_geometry(cmd, slot);
            vkd.cmd_end_render_pass(cmd);
        }
    }

    unsafe fn record_dynamic(&self, cmd: vk::CommandBuffer, slot: usize, image: u32) {
        let vkd = self.device.raw();
        let color_image = self.swapchain.images()[image as usize];
        let color_view = self.swapchain.views().nth(image as usize).unwrap_or_default();
        let color_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let fragment_tests = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;

        let to_attachment = [
            vk::ImageMemoryBarrier2 {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
                src_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                src_access_mask: vk::AccessFlags2::empty(),
                dst_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                dst_access_mask: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags2::COLOR_ATTACHMENT_READ,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                image: color_image,
                subresource_range: color_range,
                ..Default::default()
            },
            vk::ImageMemoryBarrier2 {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
                src_stage_mask: fragment_tests,
                src_access_mask: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                dst_stage_mask: fragment_tests,
                dst_access_mask: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                image: self.depth.image(),
                subresource_range: attachments::depth_range(self.depth.format()),
                ..Default::default()
            },
        ];
        let to_present = vk::ImageMemoryBarrier2 {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
            src_stage_mask: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_stage_mask: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            dst_access_mask: vk::AccessFlags2::empty(),
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            image: color_image,
            subresource_range: color_range,
            ..Default::default()
        };

        let [color_clear, depth_clear] = self.clear_values();
        let color_attachment = vk::RenderingAttachmentInfo {
            s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
            image_view: color_view,
            image_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: color_clear,
            ..Default::default()
        };
        let depth_attachment = vk::RenderingAttachmentInfo {
            s_type: vk::StructureType::RENDERING_ATTACHMENT_INFO,
            image_view: self.depth.view(),
            image_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: depth_clear,
            ..Default::default()
        };
        let p_stencil_attachment = if tools::has_stencil(self.depth.format()) {
            &depth_attachment as *const _
        } else {
            std::ptr::null()
        };
        let rendering = vk::RenderingInfo {
            s_type: vk::StructureType::RENDERING_INFO,
            render_area: self.full_area(),
            layer_count: 1,
            color_attachment_count: 1,
            p_color_attachments: &color_attachment,
            p_depth_attachment: &depth_attachment,
            p_stencil_attachment,
            ..Default::default()
        };

        unsafe {
            vkd.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo {
                    s_type: vk::StructureType::DEPENDENCY_INFO,
                    image_memory_barrier_count: to_attachment.len() as u32,
                    p_image_memory_barriers: to_attachment.as_ptr(),
                    ..Default::default()
                },
            );
            vkd.cmd_begin_rendering(cmd, &rendering);
            self.draw_geometry(cmd, slot);
            vkd.cmd_end_rendering(cmd);
            vkd.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo {
                    s_type: vk::StructureType::DEPENDENCY_INFO,
                    image_memory_barrier_count: 1,
                    p_image_memory_barriers: &to_present,
                    ..Default::default()
                },
            );
        }
    }
}

impl FrameDevice for FrameResources<'_> {
    fn wait_fence(&mut self, slot: usize) -> Result<(), vk::Result> {
        unsafe {
            self.device
                .raw()
                .wait_for_fences(&[self.sync.in_flight(slot)], true, u64::MAX)
        }
    }

    fn reset_fence(&mut self, slot: usize) -> Result<(), vk::Result> {
        unsafe { self.device.raw().reset_fences(&[self.sync.in_flight(slot)]) }
    }

    fn acquire(&mut self, slot: usize) -> Result<(u32, bool), vk::Result> {
        self.swapchain
            .acquire_next_image(self.sync.image_available(slot))
    }

    fn update_uniforms(&mut self, slot: usize) {
        self.uniforms[slot].write(&self.shader_data);
    }

    fn record(&mut self, slot: usize, image: u32) -> Result<(), vk::Result> {
        let vkd = self.device.raw();
        let cmd = self.command_buffers[slot];
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            vkd.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            vkd.begin_command_buffer(cmd, &begin)?;
            if self.dynamic_rendering {
                self.record_dynamic(cmd, slot, image);
            } else {
                self.record_render_pass(cmd, slot, image);
            }
            vkd.end_command_buffer(cmd)
        }
    }

    fn submit(&mut self, slot: usize, image: u32) -> Result<(), vk::Result> {
        let wait = self.sync.image_available(slot);
        let signal = self.sync.render_complete(image);
        let stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let cmd = self.command_buffers[slot];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: &stage,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        unsafe {
            self.device.raw().queue_submit(
                self.device.queues().graphics,
                std::slice::from_ref(&submit),
                self.sync.in_flight(slot),
            )
        }
    }

    fn present(&mut self, image: u32) -> Result<bool, vk::Result> {
        self.swapchain.queue_present(
            self.device.queues().graphics,
            image,
            self.sync.render_complete(image),
        )
    }
}
