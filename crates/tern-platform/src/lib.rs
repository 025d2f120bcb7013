// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Window collaborator on top of winit.

pub use winit;

use anyhow::{Context, Result};
use serde::Deserialize;
use tern_render::{ClientArea, RenderSize};
use tracing::{debug, info, warn};

use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event_loop::ActiveEventLoop,
    monitor::MonitorHandle,
    raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    },
    window::{Fullscreen, Window, WindowId},
};

/// How to open the main window. `None` fields fall back to the chosen
/// monitor: its video mode for the size, the primary monitor for the index.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowDesc {
    pub title: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub monitor: Option<usize>,
    pub fullscreen: bool,
    pub vsync: bool,
}

impl Default for WindowDesc {
    fn default() -> Self {
        Self {
            title: "tern".to_owned(),
            width: None,
            height: None,
            monitor: None,
            fullscreen: false,
            vsync: true,
        }
    }
}

pub struct AppWindow {
    window: Window,
    desc: WindowDesc,
    size: RenderSize,
    open: bool,
}

impl AppWindow {
    pub fn create(event_loop: &ActiveEventLoop, desc: WindowDesc) -> Result<Self> {
        let monitors: Vec<MonitorHandle> = event_loop.available_monitors().collect();
        let monitor = pick_monitor(&monitors, event_loop.primary_monitor(), desc.monitor);

        let video = monitor
            .as_ref()
            .map(MonitorHandle::size)
            .unwrap_or(PhysicalSize::new(1280, 720));
        let size = RenderSize::new(
            desc.width.unwrap_or(video.width),
            desc.height.unwrap_or(video.height),
        );

        let mut attrs = Window::default_attributes()
            .with_title(desc.title.clone())
            .with_inner_size(PhysicalSize::new(size.width, size.height));

        if let Some(m) = &monitor {
            let (x, y) = centered_position(m.position(), m.size(), size);
            attrs = attrs.with_position(PhysicalPosition::new(x, y));
            if desc.fullscreen {
                attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(Some(m.clone()))));
            }
        }

        let window = event_loop.create_window(attrs).context("create_window")?;
        let inner = window.inner_size();
        info!(
            "window \"{}\" {}x{} (fullscreen={}, vsync={})",
            desc.title, inner.width, inner.height, desc.fullscreen, desc.vsync
        );

        Ok(Self {
            window,
            size: RenderSize::new(inner.width, inner.height),
            desc,
            open: true,
        })
    }

    pub fn id(&self) -> WindowId {
        self.window.id()
    }

    pub fn inner(&self) -> &Window {
        &self.window
    }

    pub fn desc(&self) -> &WindowDesc {
        &self.desc
    }

    /// False once a close was requested. Events are pumped by the winit
    /// event loop, so there is no separate poll call.
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Records a size reported by the event loop.
    pub fn handle_resized(&mut self, size: PhysicalSize<u32>) {
        self.size = RenderSize::new(size.width, size.height);
    }
}

impl Drop for AppWindow {
    fn drop(&mut self) {
        debug!("window \"{}\" destroyed", self.desc.title);
    }
}

impl ClientArea for AppWindow {
    fn client_size(&self) -> RenderSize {
        self.size
    }

    fn set_resolution(&mut self, size: RenderSize) {
        // the platform may apply this asynchronously and report back through Resized
        if let Some(applied) = self
            .window
            .request_inner_size(PhysicalSize::new(size.width, size.height))
        {
            debug!("resolution applied immediately: {}x{}", applied.width, applied.height);
        }
        self.size = size;
    }

    fn vsync(&self) -> bool {
        self.desc.vsync
    }
}

impl HasWindowHandle for AppWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for AppWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

/// Resolves a configured monitor index, warning and using the primary
/// monitor when it is out of range.
pub fn pick_monitor<M: Clone>(monitors: &[M], primary: Option<M>, index: Option<usize>) -> Option<M> {
    match index {
        None => primary.or_else(|| monitors.first().cloned()),
        Some(i) if i < monitors.len() => Some(monitors[i].clone()),
        Some(i) => {
            warn!(
                "monitor index {i} is out of range ({} monitor(s)); using the primary monitor",
                monitors.len()
            );
            primary.or_else(|| monitors.first().cloned())
        }
    }
}

/// Top-left corner that centres `window` on a monitor.
pub fn centered_position(
    monitor_pos: PhysicalPosition<i32>,
    monitor_size: PhysicalSize<u32>,
    window: RenderSize,
) -> (i32, i32) {
    let x = monitor_pos.x + monitor_size.width as i32 / 2 - window.width as i32 / 2;
    let y = monitor_pos.y + monitor_size.height as i32 / 2 - window.height as i32 / 2;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_index_uses_primary() {
        let monitors = ["a", "b", "c"];
        assert_eq!(pick_monitor(&monitors, Some("b"), None), Some("b"));
        assert_eq!(pick_monitor(&monitors, None, None), Some("a"));
    }

    #[test]
    fn valid_index_is_honoured() {
        let monitors = ["a", "b", "c"];
        assert_eq!(pick_monitor(&monitors, Some("a"), Some(2)), Some("c"));
    }

    #[test]
    fn out_of_range_index_falls_back_to_primary() {
        let monitors = ["a", "b"];
        assert_eq!(pick_monitor(&monitors, Some("b"), Some(7)), Some("b"));
        let none: [&str; 0] = [];
        assert_eq!(pick_monitor(&none, None, Some(0)), None);
    }

    #[test]
    fn centres_on_monitor_origin() {
        let pos = centered_position(
            PhysicalPosition::new(1920, 0),
            PhysicalSize::new(1920, 1080),
            RenderSize::new(800, 600),
        );
        assert_eq!(pos, (1920 + 960 - 400, 540 - 300));
    }

    #[test]
    fn window_desc_defaults_leave_size_unset() {
        let desc = WindowDesc::default();
        assert_eq!(desc.width, None);
        assert_eq!(desc.monitor, None);
        assert!(desc.vsync);
    }
}
