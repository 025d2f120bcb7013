// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::VkError;
use crate::handle::{DeviceOwned, InstanceOwned};
use crate::instance::Instance;
use crate::sync::MAX_CONCURRENT_FRAMES;

/// Backend-wide state, filled in step by step during initialization.
///
/// Later steps read what earlier ones wrote; the accessors report
/// [`VkError::NotReady`] when a step runs before its inputs exist.
pub struct GraphicsContext {
    pub render_pass: DeviceOwned<vk::RenderPass>,
    pub command_pool: DeviceOwned<vk::CommandPool>,
    pub device: Option<Arc<Device>>,
    pub debug_messenger: Option<InstanceOwned<vk::DebugUtilsMessengerEXT>>,
    pub instance: Option<Arc<Instance>>,
    pub physical_device: vk::PhysicalDevice,
    pub depth_format: vk::Format,
    pub color_format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsContext {
    fn default() -> Self {
        Self {
            render_pass: DeviceOwned::null(),
            command_pool: DeviceOwned::null(),
            device: None,
            debug_messenger: None,
            instance: None,
            physical_device: vk::PhysicalDevice::null(),
            depth_format: vk::Format::UNDEFINED,
            color_format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            extent: vk::Extent2D::default(),
            image_count: 0,
            max_frames_in_flight: MAX_CONCURRENT_FRAMES,
        }
    }
}

impl GraphicsContext {
    pub fn instance(&self) -> Result<&Arc<Instance>, VkError> {
        self.instance.as_ref().ok_or(VkError::NotReady("instance"))
    }

    pub fn device(&self) -> Result<&Arc<Device>, VkError> {
        self.device.as_ref().ok_or(VkError::NotReady("logical device"))
    }

    pub fn command_pool(&self) -> Result<vk::CommandPool, VkError> {
        if self.command_pool.is_null() {
            return Err(VkError::NotReady("command pool"));
        }
        Ok(self.command_pool.raw())
    }

    /// Null when rendering dynamically.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_reports_missing_inputs() {
        let ctx = GraphicsContext::default();
        assert!(matches!(ctx.instance(), Err(VkError::NotReady("instance"))));
        assert!(matches!(ctx.device(), Err(VkError::NotReady(_))));
        assert!(ctx.command_pool().is_err());
        assert_eq!(ctx.render_pass(), vk::RenderPass::null());
        assert_eq!(ctx.max_frames_in_flight, MAX_CONCURRENT_FRAMES);
    }
}
