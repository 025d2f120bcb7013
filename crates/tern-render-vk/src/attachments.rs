// SPDX-License-Identifier: CEPL-1.0
//! Depth/stencil target, render pass, pipeline cache and framebuffers.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::{VkError, VkResultExt};
use crate::handle::DeviceOwned;
use crate::tools;

/// Device-local depth(+stencil) image sized to the swapchain.
pub struct DepthStencil {
    view: DeviceOwned<vk::ImageView>,
    image: DeviceOwned<vk::Image>,
    memory: DeviceOwned<vk::DeviceMemory>,
    format: vk::Format,
}

impl DepthStencil {
    pub fn new(device: &Arc<Device>, extent: vk::Extent2D) -> Result<Self, VkError> {
        let format = device.depth_format();
        let vkd = device.raw();

        let image_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = DeviceOwned::new(
            device.clone(),
            unsafe { vkd.create_image(&image_ci, None) }.call("vkCreateImage")?,
        );

        let req = unsafe { vkd.get_image_memory_requirements(*image) };
        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: device
                .memory_type(req.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?,
            ..Default::default()
        };
        let memory = DeviceOwned::new(
            device.clone(),
            unsafe { vkd.allocate_memory(&alloc, None) }.call("vkAllocateMemory")?,
        );
        unsafe { vkd.bind_image_memory(*image, *memory, 0) }.call("vkBindImageMemory")?;

        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: *image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: depth_range(format),
            ..Default::default()
        };
        let view = DeviceOwned::new(
            device.clone(),
            unsafe { vkd.create_image_view(&view_ci, None) }.call("vkCreateImageView")?,
        );

        Ok(Self {
            view,
            image,
            memory,
            format,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.raw()
    }

    pub fn image(&self) -> vk::Image {
        self.image.raw()
    }

    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.raw()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

pub fn depth_range(format: vk::Format) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: tools::depth_aspect(format),
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn render_pass_attachments(
    color: vk::Format,
    depth: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    [
        vk::AttachmentDescription {
            format: color,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::CLEAR,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ]
}

/// Both dependencies are external -> 0: the first waits out the previous
/// frame's depth writes, the second its color writes.
pub fn render_pass_dependencies() -> [vk::SubpassDependency; 2] {
    let fragment_tests = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    [
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: fragment_tests,
            dst_stage_mask: fragment_tests,
            src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            dependency_flags: vk::DependencyFlags::empty(),
        },
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::COLOR_ATTACHMENT_READ,
            dependency_flags: vk::DependencyFlags::empty(),
        },
    ]
}

/// Single subpass, one color and one depth/stencil attachment.
pub fn create_render_pass(
    device: &Arc<Device>,
    color: vk::Format,
) -> Result<DeviceOwned<vk::RenderPass>, VkError> {
    let attachments = render_pass_attachments(color, device.depth_format());
    let dependencies = render_pass_dependencies();

    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };

    let ci = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: dependencies.len() as u32,
        p_dependencies: dependencies.as_ptr(),
        ..Default::default()
    };
    let pass = unsafe { device.raw().create_render_pass(&ci, None) }.call("vkCreateRenderPass")?;
    Ok(DeviceOwned::new(device.clone(), pass))
}

/// Starts empty; nothing is persisted between runs.
pub fn create_pipeline_cache(device: &Arc<Device>) -> Result<DeviceOwned<vk::PipelineCache>, VkError> {
    let ci = vk::PipelineCacheCreateInfo {
        s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
        ..Default::default()
    };
    let cache = unsafe { device.raw().create_pipeline_cache(&ci, None) }
        .call("vkCreatePipelineCache")?;
    Ok(DeviceOwned::new(device.clone(), cache))
}

/// One framebuffer per swapchain view, all sharing the depth view.
pub fn create_framebuffers(
    device: &Arc<Device>,
    render_pass: vk::RenderPass,
    color_views: impl Iterator<Item = vk::ImageView>,
    depth_view: vk::ImageView,
    extent: vk::Extent2D,
) -> Result<Vec<DeviceOwned<vk::Framebuffer>>, VkError> {
    color_views
        .map(|color| {
            let attachments = [color, depth_view];
            let ci = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { device.raw().create_framebuffer(&ci, None) }
                .call("vkCreateFramebuffer")?;
            Ok(DeviceOwned::new(device.clone(), fb))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_clear_and_store() {
        let [color, depth] =
            render_pass_attachments(vk::Format::B8G8R8A8_UNORM, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(depth.stencil_load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn dependencies_guard_depth_then_color() {
        let [depth, color] = render_pass_dependencies();
        for dep in [depth, color] {
            assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
            assert_eq!(dep.dst_subpass, 0);
        }
        assert!(depth
            .src_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(color
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(color.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn stencil_formats_get_stencil_aspect() {
        let range = depth_range(vk::Format::D32_SFLOAT_S8_UINT);
        assert!(range.aspect_mask.contains(vk::ImageAspectFlags::STENCIL));
        let range = depth_range(vk::Format::D32_SFLOAT);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }
}
