// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("{call} failed: {result}")]
    Call {
        call: &'static str,
        result: vk::Result,
    },
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error("no Vulkan physical device found")]
    NoPhysicalDevice,
    #[error("no supported depth format among the candidates")]
    NoDepthFormat,
    #[error("no memory type matches bits {type_bits:#x} with {properties:?}")]
    NoMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },
    #[error("no queue family supports {0:?}")]
    NoQueueFamily(vk::QueueFlags),
    #[error("queue family {0} cannot present to the window surface")]
    NoPresentSupport(u32),
    #[error("surface reports no formats")]
    NoSurfaceFormat,
    #[error("dynamic rendering needs Vulkan 1.3, device reports {major}.{minor}")]
    DynamicRenderingUnsupported { major: u32, minor: u32 },
    #[error("required extension {0} is not supported")]
    MissingExtension(String),
    #[error("invalid SPIR-V in {path}: {source}")]
    Shader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} has not been created yet")]
    NotReady(&'static str),
}

impl VkError {
    /// The raw result code, if this came from an API call.
    pub fn result(&self) -> Option<vk::Result> {
        match self {
            Self::Call { result, .. } => Some(*result),
            _ => None,
        }
    }

    pub fn is_device_lost(&self) -> bool {
        self.result() == Some(vk::Result::ERROR_DEVICE_LOST)
    }
}

/// Tags a raw `vk::Result` failure with the entry point that produced it.
pub trait VkResultExt<T> {
    fn call(self, name: &'static str) -> Result<T, VkError>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn call(self, name: &'static str) -> Result<T, VkError> {
        self.map_err(|result| VkError::Call { call: name, result })
    }
}

/// The ordered initialization steps of the Vulkan renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitStep {
    Base,
    Device,
    Swapchain,
    CommandBuffers,
    Synchronization,
    DepthStencil,
    RenderPass,
    Framebuffers,
    Geometry,
    UniformBuffers,
    Descriptors,
    Pipeline,
}

impl InitStep {
    pub const ALL: [InitStep; 12] = [
        InitStep::Base,
        InitStep::Device,
        InitStep::Swapchain,
        InitStep::CommandBuffers,
        InitStep::Synchronization,
        InitStep::DepthStencil,
        InitStep::RenderPass,
        InitStep::Framebuffers,
        InitStep::Geometry,
        InitStep::UniformBuffers,
        InitStep::Descriptors,
        InitStep::Pipeline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InitStep::Base => "base",
            InitStep::Device => "device",
            InitStep::Swapchain => "swapchain",
            InitStep::CommandBuffers => "command buffers",
            InitStep::Synchronization => "synchronization primitives",
            InitStep::DepthStencil => "depth/stencil",
            InitStep::RenderPass => "render pass",
            InitStep::Framebuffers => "pipeline cache and framebuffers",
            InitStep::Geometry => "geometry upload",
            InitStep::UniformBuffers => "uniform buffers",
            InitStep::Descriptors => "descriptors",
            InitStep::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("vulkan init step '{step}' failed: {source}")]
pub struct InitError {
    pub step: InitStep,
    #[source]
    pub source: VkError,
}

/// Attaches an [`InitStep`] to a step's error.
pub trait StepExt<T> {
    fn step(self, step: InitStep) -> Result<T, InitError>;
}

impl<T> StepExt<T> for Result<T, VkError> {
    fn step(self, step: InitStep) -> Result<T, InitError> {
        self.map_err(|source| InitError { step, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_tags_the_entry_point() {
        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = r.call("vkWaitForFences").unwrap_err();
        assert!(err.is_device_lost());
        assert_eq!(
            err.to_string(),
            format!("vkWaitForFences failed: {}", vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn init_error_names_the_step() {
        let r: Result<(), VkError> = Err(VkError::NoDepthFormat);
        let err = r.step(InitStep::Base).unwrap_err();
        assert_eq!(err.step, InitStep::Base);
        assert!(err.to_string().contains("'base'"));
    }

    #[test]
    fn steps_are_in_creation_order() {
        let mut sorted = InitStep::ALL;
        sorted.sort();
        assert_eq!(sorted, InitStep::ALL);
        assert_eq!(InitStep::ALL.first(), Some(&InitStep::Base));
        assert_eq!(InitStep::ALL.last(), Some(&InitStep::Pipeline));
    }
}
