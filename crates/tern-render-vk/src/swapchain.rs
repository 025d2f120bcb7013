// SPDX-License-Identifier: CEPL-1.0
//! Presentation surface and swapchain.
//!
//! The window is the source of truth for the client size. The exception is
//! a surface that reports the undefined-extent sentinel, where the size the
//! swapchain settles on is written back into the window.

use std::sync::Arc;

use ash::vk;
use tern_render::{ClientArea, PlatformBackend, RenderSize, RenderTarget};
use tracing::{error, info, warn};

use crate::device::Device;
use crate::error::{VkError, VkResultExt};
use crate::handle::{DeviceOwned, InstanceOwned};
use crate::instance::Instance;

/// Tightly packed 8-bit formats preferred for the color attachment.
pub const PREFERRED_COLOR_FORMATS: [vk::Format; 3] = [
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::A8B8G8R8_UNORM_PACK32,
];

const COMPOSITE_ALPHA_PRIORITY: [vk::CompositeAlphaFlagsKHR; 4] = [
    vk::CompositeAlphaFlagsKHR::OPAQUE,
    vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::INHERIT,
];

/// Binds the window to a new surface. An unrecognized platform backend is
/// logged and the winit handles are used anyway.
pub fn create_surface(
    instance: &Arc<Instance>,
    target: &dyn RenderTarget,
    platform: PlatformBackend,
) -> Result<InstanceOwned<vk::SurfaceKHR>, VkError> {
    match platform {
        PlatformBackend::Winit => {}
        PlatformBackend::Unknown => {
            error!("unknown platform backend requested for the surface; falling back to winit");
        }
    }

    let display = target.display_handle()?.as_raw();
    let window = target.window_handle()?.as_raw();
    let surface = unsafe {
        ash_window::create_surface(instance.entry(), instance.raw(), display, window, None)
    }
    .call("vkCreateSurfaceKHR")?;
    Ok(InstanceOwned::new(instance.clone(), surface))
}

pub struct Swapchain {
    // drop order: views, then the swapchain, then the surface
    views: Vec<DeviceOwned<vk::ImageView>>,
    images: Vec<vk::Image>,
    handle: DeviceOwned<vk::SwapchainKHR>,
    surface: InstanceOwned<vk::SurfaceKHR>,
    device: Arc<Device>,
    color_format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    queue_node_index: u32,
}

impl Swapchain {
    /// Picks the color format and the presenting queue family. No swapchain
    /// exists until [`create`](Self::create).
    pub fn new(device: Arc<Device>, surface: InstanceOwned<vk::SurfaceKHR>) -> Result<Self, VkError> {
        let mut swapchain = Self {
            views: Vec::new(),
            images: Vec::new(),
            handle: DeviceOwned::null(),
            surface,
            device,
            color_format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            queue_node_index: 0,
        };
        swapchain.setup_surface_color_format()?;
        swapchain.setup_queue_node_index()?;
        Ok(swapchain)
    }

    fn setup_surface_color_format(&mut self) -> Result<(), VkError> {
        let formats = unsafe {
            self.device
                .instance()
                .surface_loader()
                .get_physical_device_surface_formats(self.device.physical(), *self.surface)
        }
        .call("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let chosen = choose_color_format(&formats)?;
        self.color_format = chosen.format;
        self.color_space = chosen.color_space;
        Ok(())
    }

    /// Presents on the graphics family, which must support the surface.
    fn setup_queue_node_index(&mut self) -> Result<(), VkError> {
        let graphics = self.device.families().graphics;
        let supported = unsafe {
            self.device
                .instance()
                .surface_loader()
                .get_physical_device_surface_support(self.device.physical(), graphics, *self.surface)
        }
        .call("vkGetPhysicalDeviceSurfaceSupportKHR")?;
        if !supported {
            return Err(VkError::NoPresentSupport(graphics));
        }
        self.queue_node_index = graphics;
        Ok(())
    }

    /// Creates (or recreates) the swapchain for the window's current size.
    ///
    /// The previous swapchain is handed to the driver for recycling, and it
    /// and its views are destroyed only once the new one exists.
    pub fn create(&mut self, window: &mut dyn ClientArea) -> Result<(), VkError> {
        let surface_loader = self.device.instance().surface_loader();
        let physical = self.device.physical();
        let caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical, *self.surface)
        }
        .call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical, *self.surface)
        }
        .call("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let extent = negotiate_extent(&caps, window);
        let present_mode = choose_present_mode(&modes, window.vsync());
        let image_count = choose_image_count(&caps);
        let old = self.handle.raw();

        let ci = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: *self.surface,
            min_image_count: image_count,
            image_format: self.color_format,
            image_color_space: self.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: image_usage(&caps),
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: choose_transform(&caps),
            composite_alpha: choose_composite_alpha(&caps),
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };

        let loader = self.device.swapchain_loader();
        let new = unsafe { loader.create_swapchain(&ci, None) }.call("vkCreateSwapchainKHR")?;

        self.views.clear();
        self.handle.attach(self.device.clone(), new);

        self.images = unsafe { loader.get_swapchain_images(new) }.call("vkGetSwapchainImagesKHR")?;
        for &image in &self.images {
            let view = create_color_view(&self.device, image, self.color_format)?;
            self.views.push(view);
        }

        self.extent = extent;
        self.present_mode = present_mode;
        info!(
            "swapchain {}x{} {:?} {:?}, {} image(s)",
            extent.width,
            extent.height,
            self.color_format,
            present_mode,
            self.images.len()
        );
        Ok(())
    }

    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.device.swapchain_loader().acquire_next_image(
                *self.handle,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Returns `Ok(true)` when the swapchain is suboptimal.
    pub fn queue_present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &*self.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        unsafe { self.device.swapchain_loader().queue_present(queue, &present) }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle.raw()
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> impl ExactSizeIterator<Item = vk::ImageView> + '_ {
        self.views.iter().map(|v| v.raw())
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn queue_node_index(&self) -> u32 {
        self.queue_node_index
    }
}

fn create_color_view(
    device: &Arc<Device>,
    image: vk::Image,
    format: vk::Format,
) -> Result<DeviceOwned<vk::ImageView>, VkError> {
    let ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::G,
            b: vk::ComponentSwizzle::B,
            a: vk::ComponentSwizzle::A,
        },
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    let view = unsafe { device.raw().create_image_view(&ci, None) }.call("vkCreateImageView")?;
    Ok(DeviceOwned::new(device.clone(), view))
}

/// First reported format on the allow-list, else the first reported format.
pub fn choose_color_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR, VkError> {
    let first = *formats.first().ok_or(VkError::NoSurfaceFormat)?;
    Ok(formats
        .iter()
        .copied()
        .find(|f| PREFERRED_COLOR_FORMATS.contains(&f.format))
        .unwrap_or(first))
}

/// Settles the swapchain extent against the surface capabilities.
///
/// With the undefined-size sentinel the window's size is clamped into the
/// allowed range and pushed back into the window. Otherwise the surface's
/// current extent wins and a mismatch with the window is only reported.
pub fn negotiate_extent(caps: &vk::SurfaceCapabilitiesKHR, window: &mut dyn ClientArea) -> vk::Extent2D {
    let size = window.client_size();
    if caps.current_extent.width == u32::MAX {
        let extent = vk::Extent2D {
            width: size
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: size
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        };
        window.set_resolution(RenderSize::new(extent.width, extent.height));
        extent
    } else {
        let extent = caps.current_extent;
        if extent.width != size.width || extent.height != size.height {
            warn!(
                "surface extent {}x{} differs from window size {}x{}",
                extent.width, extent.height, size.width, size.height
            );
        }
        extent
    }
}

/// FIFO under vsync. Without it MAILBOX is preferred, then IMMEDIATE, and
/// FIFO (always available) as the last resort.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    let mut chosen = vk::PresentModeKHR::FIFO;
    for &mode in modes {
        if mode == vk::PresentModeKHR::MAILBOX {
            return mode;
        }
        if mode == vk::PresentModeKHR::IMMEDIATE {
            chosen = mode;
        }
    }
    chosen
}

/// One more than the minimum, clamped when the surface declares a maximum.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

pub fn choose_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

pub fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    COMPOSITE_ALPHA_PRIORITY
        .into_iter()
        .find(|&flag| caps.supported_composite_alpha.contains(flag))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Color attachment, plus transfer source/destination when offered.
pub fn image_usage(caps: &vk::SurfaceCapabilitiesKHR) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    for extra in [
        vk::ImageUsageFlags::TRANSFER_SRC,
        vk::ImageUsageFlags::TRANSFER_DST,
    ] {
        if caps.supported_usage_flags.contains(extra) {
            usage |= extra;
        }
    }
    usage
}
