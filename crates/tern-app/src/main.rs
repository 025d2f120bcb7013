// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

mod config;
mod layers;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tern_core::{init_tracing, AssetPaths};
use tern_math::CameraKind;
use tern_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::PhysicalKey,
    window::WindowId,
};
use tern_platform::AppWindow;
use tern_render::{ClientArea, GraphicsBackend, MeshId, Renderer};
use tern_render_gl::GlRenderer;
use tern_render_vk::VulkanRenderer;
use tracing::{error, info};

use config::{AppConfig, DEFAULT_CONFIG};
use layers::{CameraController, LayerStack};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Gl,
    Vk,
}

impl From<BackendArg> for GraphicsBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Gl => GraphicsBackend::Gl,
            BackendArg::Vk => GraphicsBackend::Vk,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Renderer backend; overrides `[render] backend`
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
    /// Config file (default: ./tern.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Load assets from the workspace tree instead of next to the binary
    #[arg(long)]
    editor: bool,
}

impl Args {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(backend) = self.backend {
            cfg.render.backend = backend.into();
        }
        if self.width.is_some() {
            cfg.window.width = self.width;
        }
        if self.height.is_some() {
            cfg.window.height = self.height;
        }
    }
}

enum Backend {
    Gl(Box<GlRenderer>),
    Vk(Box<VulkanRenderer>),
}

impl Backend {
    fn renderer(&mut self) -> &mut dyn Renderer {
        match self {
            Backend::Gl(r) => r.as_mut(),
            Backend::Vk(r) => r.as_mut(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Backend::Gl(_) => "gl",
            Backend::Vk(_) => "vk",
        }
    }
}

/// Vulkan first when asked for, GL when asked for or as the fallback.
fn create_backend(window: &mut AppWindow, cfg: &AppConfig, paths: &AssetPaths) -> Result<Backend> {
    if cfg.render.backend == GraphicsBackend::Vk {
        match VulkanRenderer::new(window, &cfg.render, paths) {
            Ok(vk) => return Ok(Backend::Vk(Box::new(vk))),
            Err(err) => error!("vulkan init failed: {err:#}; falling back to gl"),
        }
    }
    let gl = GlRenderer::new(window, &cfg.render, paths).context("gl init")?;
    Ok(Backend::Gl(Box::new(gl)))
}

/// A renderer that could not rebuild its surface resources cannot draw
/// again, so the error is returned for the caller to treat as fatal.
fn resize_renderer(
    name: &str,
    renderer: &mut dyn Renderer,
    window: &mut dyn ClientArea,
) -> Result<()> {
    renderer.resize(window).with_context(|| format!("{name} resize"))
}

struct App {
    cfg: AppConfig,
    paths: AssetPaths,
    layers: LayerStack,
    // dropped before the window
    backend: Option<Backend>,
    window: Option<AppWindow>,
    triangle: MeshId,
    last_frame: Instant,
    paused: bool,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppConfig, paths: AssetPaths) -> Self {
        let mut layers = LayerStack::default();
        layers.push(Box::new(CameraController::new(CameraKind::FirstPerson)));
        Self {
            cfg,
            paths,
            layers,
            backend: None,
            window: None,
            triangle: MeshId::default(),
            last_frame: Instant::now(),
            paused: false,
            fatal: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let mut window = AppWindow::create(event_loop, self.cfg.window.clone())?;
        let mut backend = create_backend(&mut window, &self.cfg, &self.paths)?;
        info!("backend = {}", backend.name());

        let renderer = backend.renderer();
        self.triangle = renderer.create_triangle()?;
        self.layers.attach(renderer.camera_mut());

        self.paused = window.client_size().is_empty();
        window.request_redraw();
        self.window = Some(window);
        self.backend = Some(backend);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let (Some(backend), Some(window)) = (self.backend.as_mut(), self.window.as_mut()) else {
            return Ok(());
        };
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let renderer = backend.renderer();
        self.layers.update(dt, renderer.camera_mut());
        renderer.clear_screen(self.cfg.render.clear_color);
        renderer.draw(window, self.triangle)?;
        renderer.swap_buffers()?;
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.fatal = Some(err);
        self.backend = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        match &self.window {
            Some(window) if window.id() == window_id => {}
            _ => return,
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                if let Some(window) = &mut self.window {
                    window.close();
                }
                self.backend = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                let (Some(backend), Some(window)) = (self.backend.as_mut(), self.window.as_mut())
                else {
                    return;
                };
                window.handle_resized(size);
                let paused = window.client_size().is_empty();
                if paused != self.paused {
                    info!("{}x{} (paused={paused})", size.width, size.height);
                    self.paused = paused;
                }
                if paused {
                    return;
                }
                let name = backend.name();
                if let Err(err) = resize_renderer(name, backend.renderer(), window) {
                    self.fail(event_loop, err);
                    return;
                }
                window.request_redraw();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.layers.key(code, event.state.is_pressed());
                }
            }

            WindowEvent::RedrawRequested => {
                if self.paused {
                    return;
                }
                if let Err(err) = self.frame() {
                    self.fail(event_loop, err);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.paused {
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let (config_path, explicit) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let mut cfg = AppConfig::load(&config_path, explicit);
    args.apply(&mut cfg);

    let paths = match &cfg.assets.dir {
        Some(dir) => AssetPaths::with_assets_dir(dir),
        None => AssetPaths::from_executable(args.editor).context("resolve asset paths")?,
    };
    info!("assets at {}", paths.assets_dir().display());

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, paths);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config_values() {
        let args = Args::parse_from(["tern", "--backend", "gl", "--width", "640", "--editor"]);
        let mut cfg = AppConfig::parse("[window]\nwidth = 1024\nheight = 768").unwrap();
        args.apply(&mut cfg);
        assert_eq!(cfg.render.backend, GraphicsBackend::Gl);
        assert_eq!(cfg.window.width, Some(640));
        assert_eq!(cfg.window.height, Some(768));
        assert!(args.editor);
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let args = Args::parse_from(["tern"]);
        let mut cfg = AppConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.render.backend, GraphicsBackend::Vk);
        assert_eq!(cfg.window.width, None);
        assert!(args.config.is_none());
    }

    struct FailingResize {
        camera: tern_math::Camera,
    }

    impl Renderer for FailingResize {
        fn new(
            _: &mut dyn tern_render::RenderTarget,
            _: &tern_render::RendererDesc,
            _: &AssetPaths,
        ) -> Result<Self> {
            anyhow::bail!("not constructed through new")
        }
        fn clear_screen(&mut self, _rgba: [f32; 4]) {}
        fn swap_buffers(&mut self) -> Result<()> {
            Ok(())
        }
        fn create_triangle(&mut self) -> Result<MeshId> {
            Ok(MeshId::default())
        }
        fn draw(&mut self, _window: &mut dyn ClientArea, _mesh: MeshId) -> Result<()> {
            Ok(())
        }
        fn resize(&mut self, _window: &mut dyn ClientArea) -> Result<()> {
            anyhow::bail!("vkCreateFramebuffer failed: ERROR_OUT_OF_DEVICE_MEMORY")
        }
        fn camera(&self) -> &tern_math::Camera {
            &self.camera
        }
        fn camera_mut(&mut self) -> &mut tern_math::Camera {
            &mut self.camera
        }
    }

    struct Area(tern_render::RenderSize);

    impl ClientArea for Area {
        fn client_size(&self) -> tern_render::RenderSize {
            self.0
        }
        fn set_resolution(&mut self, size: tern_render::RenderSize) {
            self.0 = size;
        }
        fn vsync(&self) -> bool {
            true
        }
    }

    #[test]
    fn resize_failure_is_returned_with_backend_context() {
        let mut renderer = FailingResize {
            camera: tern_math::Camera::default(),
        };
        let mut area = Area(tern_render::RenderSize::new(640, 480));
        let err = resize_renderer("vk", &mut renderer, &mut area).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.starts_with("vk resize"), "{text}");
        assert!(text.contains("ERROR_OUT_OF_DEVICE_MEMORY"), "{text}");
    }

    #[test]
    fn unknown_backend_flag_is_rejected() {
        assert!(Args::try_parse_from(["tern", "--backend", "metal"]).is_err());
    }
}
