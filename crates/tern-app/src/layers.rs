// SPDX-License-Identifier: CEPL-1.0
//! Per-frame application logic, run in push order before drawing.

use tern_math::{Camera, CameraKeys, CameraKind};
use tern_platform::winit::keyboard::KeyCode;
use tracing::debug;

pub trait Layer {
    fn name(&self) -> &str;

    fn on_attach(&mut self, _camera: &mut Camera) {}

    /// Returns true when the key was consumed.
    fn on_key(&mut self, _key: KeyCode, _pressed: bool) -> bool {
        false
    }

    fn on_update(&mut self, dt: f32, camera: &mut Camera);
}

#[derive(Default)]
pub struct LayerStack {
    layers: Vec<Box<dyn Layer>>,
}

impl LayerStack {
    pub fn push(&mut self, layer: Box<dyn Layer>) {
        debug!("layer '{}' pushed", layer.name());
        self.layers.push(layer);
    }

    pub fn attach(&mut self, camera: &mut Camera) {
        for layer in &mut self.layers {
            layer.on_attach(camera);
        }
    }

    /// Offers the key to layers top-down until one consumes it.
    pub fn key(&mut self, key: KeyCode, pressed: bool) -> bool {
        self.layers
            .iter_mut()
            .rev()
            .any(|layer| layer.on_key(key, pressed))
    }

    pub fn update(&mut self, dt: f32, camera: &mut Camera) {
        for layer in &mut self.layers {
            layer.on_update(dt, camera);
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

pub fn camera_key(key: KeyCode) -> Option<CameraKeys> {
    match key {
        KeyCode::KeyW | KeyCode::ArrowUp => Some(CameraKeys::UP),
        KeyCode::KeyS | KeyCode::ArrowDown => Some(CameraKeys::DOWN),
        KeyCode::KeyA | KeyCode::ArrowLeft => Some(CameraKeys::LEFT),
        KeyCode::KeyD | KeyCode::ArrowRight => Some(CameraKeys::RIGHT),
        _ => None,
    }
}

/// Feeds held WASD/arrow keys into the camera.
pub struct CameraController {
    kind: CameraKind,
    keys: CameraKeys,
}

impl CameraController {
    pub fn new(kind: CameraKind) -> Self {
        Self {
            kind,
            keys: CameraKeys::empty(),
        }
    }

    pub fn keys(&self) -> CameraKeys {
        self.keys
    }
}

impl Layer for CameraController {
    fn name(&self) -> &str {
        "camera controller"
    }

    fn on_attach(&mut self, camera: &mut Camera) {
        camera.set_kind(self.kind);
    }

    fn on_key(&mut self, key: KeyCode, pressed: bool) -> bool {
        let Some(flag) = camera_key(key) else {
            return false;
        };
        self.keys.set(flag, pressed);
        true
    }

    fn on_update(&mut self, dt: f32, camera: &mut Camera) {
        if camera.keys() != self.keys {
            camera.set_keys(self.keys);
        }
        camera.update(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_math::Vec3;

    #[test]
    fn wasd_and_arrows_share_flags() {
        assert_eq!(camera_key(KeyCode::KeyW), camera_key(KeyCode::ArrowUp));
        assert_eq!(camera_key(KeyCode::KeyD), Some(CameraKeys::RIGHT));
        assert_eq!(camera_key(KeyCode::Space), None);
    }

    #[test]
    fn controller_tracks_press_and_release() {
        let mut ctl = CameraController::new(CameraKind::FirstPerson);
        assert!(ctl.on_key(KeyCode::KeyW, true));
        assert!(ctl.on_key(KeyCode::ArrowLeft, true));
        assert_eq!(ctl.keys(), CameraKeys::UP | CameraKeys::LEFT);
        assert!(ctl.on_key(KeyCode::KeyW, false));
        assert_eq!(ctl.keys(), CameraKeys::LEFT);
        assert!(!ctl.on_key(KeyCode::Escape, true));
    }

    #[test]
    fn held_key_moves_a_first_person_camera() {
        let mut camera = Camera::new(CameraKind::LookAt, false);
        camera.set_position(Vec3::new(0.0, 0.0, -2.5));

        let mut stack = LayerStack::default();
        stack.push(Box::new(CameraController::new(CameraKind::FirstPerson)));
        stack.attach(&mut camera);
        assert_eq!(camera.kind(), CameraKind::FirstPerson);

        assert!(stack.key(KeyCode::KeyW, true));
        let before = camera.position();
        stack.update(0.5, &mut camera);
        assert_ne!(camera.position(), before);

        stack.key(KeyCode::KeyW, false);
        let after = camera.position();
        stack.update(0.5, &mut camera);
        assert_eq!(camera.position(), after);
    }

    #[test]
    fn unconsumed_keys_fall_through() {
        let mut stack = LayerStack::default();
        assert!(stack.is_empty());
        assert!(!stack.key(KeyCode::KeyW, true));
        stack.push(Box::new(CameraController::new(CameraKind::LookAt)));
        assert_eq!(stack.len(), 1);
        assert!(!stack.key(KeyCode::KeyQ, true));
    }
}
