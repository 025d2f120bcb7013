// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::{VkError, VkResultExt};
use crate::handle::DeviceOwned;

/// Frames the CPU may record ahead of the GPU.
pub const MAX_CONCURRENT_FRAMES: usize = 2;

/// Fences and semaphores for the frame loop.
///
/// Fences and image-available semaphores belong to frame slots. The
/// render-complete semaphores belong to swapchain images, so their count
/// follows the image count and they are rebuilt with the swapchain.
pub struct FrameSync {
    in_flight: Vec<DeviceOwned<vk::Fence>>,
    image_available: Vec<DeviceOwned<vk::Semaphore>>,
    render_complete: Vec<DeviceOwned<vk::Semaphore>>,
}

impl FrameSync {
    pub fn new(device: &Arc<Device>, frames: usize, images: u32) -> Result<Self, VkError> {
        let mut sync = Self {
            in_flight: Vec::with_capacity(frames),
            image_available: Vec::with_capacity(frames),
            render_complete: Vec::with_capacity(images as usize),
        };

        for _ in 0..frames {
            // signaled so the first wait on each slot returns immediately
            sync.in_flight
                .push(create_fence(device, vk::FenceCreateFlags::SIGNALED)?);
            sync.image_available.push(create_semaphore(device)?);
        }
        for _ in 0..images {
            sync.render_complete.push(create_semaphore(device)?);
        }
        Ok(sync)
    }

    pub fn frames(&self) -> usize {
        self.in_flight.len()
    }

    pub fn images(&self) -> usize {
        self.render_complete.len()
    }

    pub fn in_flight(&self, slot: usize) -> vk::Fence {
        self.in_flight[slot].raw()
    }

    pub fn image_available(&self, slot: usize) -> vk::Semaphore {
        self.image_available[slot].raw()
    }

    pub fn render_complete(&self, image: u32) -> vk::Semaphore {
        self.render_complete[image as usize].raw()
    }
}

pub fn create_fence(
    device: &Arc<Device>,
    flags: vk::FenceCreateFlags,
) -> Result<DeviceOwned<vk::Fence>, VkError> {
    let ci = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags,
        ..Default::default()
    };
    let fence = unsafe { device.raw().create_fence(&ci, None) }.call("vkCreateFence")?;
    Ok(DeviceOwned::new(device.clone(), fence))
}

pub fn create_semaphore(device: &Arc<Device>) -> Result<DeviceOwned<vk::Semaphore>, VkError> {
    let ci = vk::SemaphoreCreateInfo {
        s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
        ..Default::default()
    };
    let semaphore = unsafe { device.raw().create_semaphore(&ci, None) }.call("vkCreateSemaphore")?;
    Ok(DeviceOwned::new(device.clone(), semaphore))
}
