// SPDX-License-Identifier: CEPL-1.0
//! Explicit Vulkan backend: instance and device bring-up, swapchain
//! management, and a double-buffered frame loop drawing indexed geometry.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod attachments;
pub mod buffer;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod frame;
pub mod handle;
pub mod instance;
pub mod pipeline;
pub mod renderer;
pub mod swapchain;
pub mod sync;
pub mod tools;

pub use error::{InitError, InitStep, VkError};
pub use renderer::VulkanRenderer;
