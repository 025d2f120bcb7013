// SPDX-License-Identifier: CEPL-1.0
//! Minimal OpenGL backend: EGL context through glutin, calls through glow.
#![deny(unsafe_op_in_unsafe_fn)]

use std::ffi::CString;
use std::num::NonZeroU32;

use anyhow::{anyhow, Context, Result};
use glow::HasContext as _;
use glutin::{
    config::ConfigTemplateBuilder,
    context::{
        ContextApi, ContextAttributesBuilder, NotCurrentContext, PossiblyCurrentContext, Version,
    },
    display::{Display, DisplayApiPreference},
    prelude::*,
    surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface},
};
use raw_window_handle::RawWindowHandle;
use tern_core::{AssetPaths, Slots};
use tern_math::{Camera, CameraKind, Mat4, Vec3};
use tern_render::{
    ClientArea, MeshId, RenderSize, RenderTarget, Renderer, RendererDesc, Vertex,
    TRIANGLE_INDICES, TRIANGLE_VERTICES,
};
use tracing::{debug, info, warn};

const VERT_SRC: &str = r#"#version 330 core
layout(location = 0) in vec3 inPos;
uniform mat4 mvp;
void main() {
    gl_Position = mvp * vec4(inPos, 1.0);
}"#;

const FRAG_SRC: &str = r#"#version 330 core
out vec4 outColor;
void main() { outColor = vec4(1.0, 0.5, 0.2, 1.0); }"#;

/// GPU objects backing one mesh.
#[derive(Clone, Copy)]
struct GlMesh {
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    ebo: glow::Buffer,
    index_count: i32,
}

pub struct GlRenderer {
    meshes: Slots<GlMesh>,
    program: glow::Program,
    mvp: Option<glow::UniformLocation>,
    gl: glow::Context,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    camera: Camera,
    size: RenderSize,
    vsync: bool,
}

fn compile_program(gl: &glow::Context) -> Result<glow::Program> {
    unsafe {
        let program = gl.create_program().map_err(anyhow::Error::msg)?;
        let mut shaders = Vec::with_capacity(2);
        for (kind, src, name) in [
            (glow::VERTEX_SHADER, VERT_SRC, "vert"),
            (glow::FRAGMENT_SHADER, FRAG_SRC, "frag"),
        ] {
            let shader = gl.create_shader(kind).map_err(anyhow::Error::msg)?;
            gl.shader_source(shader, src);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                return Err(anyhow!("GL {name} compile: {}", gl.get_shader_info_log(shader)));
            }
            gl.attach_shader(program, shader);
            shaders.push(shader);
        }

        gl.link_program(program);
        if !gl.get_program_link_status(program) {
            return Err(anyhow!("GL link: {}", gl.get_program_info_log(program)));
        }

        for shader in shaders {
            gl.detach_shader(program, shader);
            gl.delete_shader(shader);
        }
        Ok(program)
    }
}

fn swap_interval(vsync: bool) -> SwapInterval {
    if vsync {
        SwapInterval::Wait(NonZeroU32::MIN)
    } else {
        SwapInterval::DontWait
    }
}

impl GlRenderer {
    fn make_current(
        display: &Display,
        window_handle: RawWindowHandle,
        size: RenderSize,
    ) -> Result<(PossiblyCurrentContext, Surface<WindowSurface>, glow::Context)> {
        let template = ConfigTemplateBuilder::new().with_depth_size(24).build();
        let mut configs = unsafe { display.find_configs(template) }.context("find_configs")?;
        let config = configs.next().ok_or_else(|| anyhow!("no GL configs"))?;
        let w = NonZeroU32::new(size.width).unwrap_or(NonZeroU32::MIN);
        let h = NonZeroU32::new(size.height).unwrap_or(NonZeroU32::MIN);

        let sattrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(window_handle, w, h);
        let surface = unsafe { display.create_window_surface(&config, &sattrs) }
            .context("create_window_surface")?;
        let ctx_attrs = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(window_handle));
        let not_current: NotCurrentContext =
            unsafe { display.create_context(&config, &ctx_attrs) }.context("create_context")?;

        let context = not_current.make_current(&surface).context("make_current")?;

        let gl = unsafe {
            glow::Context::from_loader_function(|s| {
                CString::new(s)
                    .map(|name| display.get_proc_address(&name))
                    .unwrap_or(std::ptr::null())
            })
        };

        Ok((context, surface, gl))
    }

    fn upload_mesh(&self, vertices: &[Vertex], indices: &[u32]) -> Result<GlMesh> {
        let gl = &self.gl;
        unsafe {
            let vao = gl.create_vertex_array().map_err(anyhow::Error::msg)?;
            let vbo = gl.create_buffer().map_err(anyhow::Error::msg)?;
            let ebo = gl.create_buffer().map_err(anyhow::Error::msg)?;

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STATIC_DRAW,
            );
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(indices),
                glow::STATIC_DRAW,
            );
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(
                0,
                3,
                glow::FLOAT,
                false,
                std::mem::size_of::<Vertex>() as i32,
                0,
            );
            gl.bind_vertex_array(None);

            Ok(GlMesh {
                vao,
                vbo,
                ebo,
                index_count: indices.len() as i32,
            })
        }
    }

    fn delete_mesh(&self, mesh: GlMesh) {
        unsafe {
            self.gl.delete_vertex_array(mesh.vao);
            self.gl.delete_buffer(mesh.vbo);
            self.gl.delete_buffer(mesh.ebo);
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

impl Renderer for GlRenderer {
    fn new(target: &mut dyn RenderTarget, desc: &RendererDesc, _paths: &AssetPaths) -> Result<Self> {
        let wh = target.window_handle().context("window handle")?.as_raw();
        let dh = target.display_handle().context("display handle")?.as_raw();

        let display =
            unsafe { Display::new(dh, DisplayApiPreference::Egl) }.context("Display::new")?;

        let size = target.client_size();
        let vsync = target.vsync();
        let (context, surface, gl) = Self::make_current(&display, wh, size)?;
        if let Err(err) = surface.set_swap_interval(&context, swap_interval(vsync)) {
            warn!("swap interval not applied: {err}");
        }

        let program = compile_program(&gl)?;
        let mvp = unsafe { gl.get_uniform_location(program, "mvp") };

        unsafe {
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LEQUAL);
            gl.disable(glow::CULL_FACE);
            let [r, g, b, a] = desc.clear_color;
            gl.clear_color(r, g, b, a);
        }

        let mut camera = Camera::new(CameraKind::LookAt, false);
        camera.set_position(Vec3::new(0.0, 0.0, -2.5));
        camera.set_perspective(60.0, size.aspect(), 1.0, 256.0);

        info!("gl renderer ready: {}x{}", size.width, size.height);

        Ok(Self {
            meshes: Slots::new(),
            program,
            mvp,
            gl,
            surface,
            context,
            camera,
            size,
            vsync,
        })
    }

    fn clear_screen(&mut self, rgba: [f32; 4]) {
        if self.size.is_empty() {
            return;
        }
        unsafe {
            self.gl
                .viewport(0, 0, self.size.width as i32, self.size.height as i32);
            self.gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    fn swap_buffers(&mut self) -> Result<()> {
        if self.size.is_empty() {
            return Ok(());
        }
        self.surface
            .swap_buffers(&self.context)
            .context("swap_buffers")
    }

    fn create_triangle(&mut self) -> Result<MeshId> {
        let mesh = self.upload_mesh(&TRIANGLE_VERTICES, &TRIANGLE_INDICES)?;
        let Some(handle) = self.meshes.insert(mesh) else {
            self.delete_mesh(mesh);
            return Err(anyhow!("mesh table is full"));
        };
        let id = handle.retag();
        debug!("triangle uploaded as mesh {}", id.index());
        Ok(id)
    }

    fn draw(&mut self, _window: &mut dyn ClientArea, mesh: MeshId) -> Result<()> {
        if self.size.is_empty() {
            return Ok(());
        }
        let Some(mesh) = self.meshes.get(mesh.retag()) else {
            warn!("draw of unknown mesh {}:{}", mesh.index(), mesh.generation());
            return Ok(());
        };

        let mvp = self.camera.perspective() * self.camera.view() * Mat4::IDENTITY;
        unsafe {
            self.gl.use_program(Some(self.program));
            self.gl
                .uniform_matrix_4_f32_slice(self.mvp.as_ref(), false, &mvp.to_cols_array());
            self.gl.bind_vertex_array(Some(mesh.vao));
            self.gl
                .draw_elements(glow::TRIANGLES, mesh.index_count, glow::UNSIGNED_INT, 0);
            self.gl.bind_vertex_array(None);
            self.gl.use_program(None);
        }
        Ok(())
    }

    fn resize(&mut self, window: &mut dyn ClientArea) -> Result<()> {
        let size = window.client_size();
        self.size = size;
        let (Some(w), Some(h)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) else {
            debug!("window has no area; rendering paused");
            return Ok(());
        };

        self.surface.resize(&self.context, w, h);
        self.vsync = window.vsync();
        if let Err(err) = self
            .surface
            .set_swap_interval(&self.context, swap_interval(self.vsync))
        {
            warn!("swap interval not applied: {err}");
        }
        self.camera.update_aspect_ratio(size.aspect());
        Ok(())
    }

    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }
}

impl Drop for GlRenderer {
    fn drop(&mut self) {
        let meshes = std::mem::take(&mut self.meshes);
        let count = meshes.len();
        for mesh in meshes.into_values() {
            self.delete_mesh(mesh);
        }
        unsafe { self.gl.delete_program(self.program) };
        debug!("gl renderer destroyed ({count} mesh(es))");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_interval_follows_vsync() {
        assert!(matches!(swap_interval(true), SwapInterval::Wait(n) if n.get() == 1));
        assert!(matches!(swap_interval(false), SwapInterval::DontWait));
    }

    #[test]
    fn shaders_declare_the_mvp_uniform() {
        assert!(VERT_SRC.contains("uniform mat4 mvp"));
        assert!(VERT_SRC.contains("layout(location = 0) in vec3"));
        assert!(FRAG_SRC.starts_with("#version 330 core"));
    }
}
