// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic rendering contract shared by the GL and Vulkan renderers.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use serde::Deserialize;
use tern_core::{AssetPaths, Handle};
use tern_math::{Camera, Mat4};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// What a renderer needs to know about the window it draws into.
///
/// The window owns the client size. The one exception is swapchain extent
/// negotiation on platforms that leave the surface size up to the
/// application, where the renderer writes its choice back through
/// [`set_resolution`](Self::set_resolution).
pub trait ClientArea {
    fn client_size(&self) -> RenderSize;
    fn set_resolution(&mut self, size: RenderSize);
    fn vsync(&self) -> bool;
}

/// A window a renderer can attach a surface or context to.
pub trait RenderTarget: ClientArea + HasWindowHandle + HasDisplayHandle {
    fn client_area_mut(&mut self) -> &mut dyn ClientArea;
}

impl<T: ClientArea + HasWindowHandle + HasDisplayHandle> RenderTarget for T {
    fn client_area_mut(&mut self) -> &mut dyn ClientArea {
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphicsBackend {
    Gl,
    #[default]
    Vk,
}

/// Window system the surface is created for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformBackend {
    #[default]
    Winit,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RendererDesc {
    pub app_name: String,
    pub backend: GraphicsBackend,
    pub platform: PlatformBackend,
    pub clear_color: [f32; 4],
    pub validation: bool,
    pub dynamic_rendering: bool,
    pub compute_queue: bool,
    pub transfer_queue: bool,
}

impl Default for RendererDesc {
    fn default() -> Self {
        Self {
            app_name: "tern".to_owned(),
            backend: GraphicsBackend::Vk,
            platform: PlatformBackend::Winit,
            clear_color: [0.5, 0.5, 0.5, 1.0],
            validation: cfg!(debug_assertions),
            dynamic_rendering: false,
            compute_queue: false,
            transfer_queue: false,
        }
    }
}

/// Tag type for mesh handles.
#[derive(Debug)]
pub enum Mesh {}

pub type MeshId = Handle<Mesh>;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
}

/// Uniform block consumed by the triangle vertex shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ShaderData {
    pub projection: [f32; 16],
    pub model: [f32; 16],
    pub view: [f32; 16],
}

impl ShaderData {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            projection: camera.perspective().to_cols_array(),
            model: Mat4::IDENTITY.to_cols_array(),
            view: camera.view().to_cols_array(),
        }
    }
}

pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex {
        position: [-0.5, 0.5, 0.0],
    },
    Vertex {
        position: [0.0, -0.5, 0.0],
    },
    Vertex {
        position: [0.5, 0.5, 0.0],
    },
];

pub const TRIANGLE_INDICES: [u32; 3] = [0, 1, 2];

pub trait Renderer {
    fn new(target: &mut dyn RenderTarget, desc: &RendererDesc, paths: &AssetPaths) -> Result<Self>
    where
        Self: Sized;

    /// Sets the color the next frame is cleared to.
    fn clear_screen(&mut self, rgba: [f32; 4]);
    fn swap_buffers(&mut self) -> Result<()>;
    fn create_triangle(&mut self) -> Result<MeshId>;
    fn draw(&mut self, window: &mut dyn ClientArea, mesh: MeshId) -> Result<()>;
    /// Called after the window's client size changed.
    fn resize(&mut self, window: &mut dyn ClientArea) -> Result<()>;
    fn camera(&self) -> &Camera;
    fn camera_mut(&mut self) -> &mut Camera;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_platform_deserializes() {
        let desc: RendererDesc = toml::from_str("platform = \"glfw\"").unwrap();
        assert_eq!(desc.platform, PlatformBackend::Unknown);
        let desc: RendererDesc = toml::from_str("platform = \"winit\"\nbackend = \"gl\"").unwrap();
        assert_eq!(desc.platform, PlatformBackend::Winit);
        assert_eq!(desc.backend, GraphicsBackend::Gl);
        // untouched fields keep their defaults
        assert_eq!(desc.clear_color, [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn shader_data_layout_matches_three_mat4() {
        assert_eq!(std::mem::size_of::<ShaderData>(), 3 * 64);
        assert_eq!(std::mem::size_of::<Vertex>(), 12);
        let cam = Camera::default();
        let data = ShaderData::from_camera(&cam);
        assert_eq!(data.model, Mat4::IDENTITY.to_cols_array());
    }

    #[test]
    fn render_size_helpers() {
        assert!(RenderSize::new(0, 600).is_empty());
        assert!(!RenderSize::new(800, 600).is_empty());
        assert!((RenderSize::new(800, 400).aspect() - 2.0).abs() < 1e-6);
    }
}
