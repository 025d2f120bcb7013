// SPDX-License-Identifier: CEPL-1.0
//! Euler-angle camera producing a projection and a view matrix.
//!
//! Angles are in degrees. Projections use a zero-to-one depth range. With
//! `flip_y` set the projection's Y scale and the view's X rotation and Y
//! translation are negated, which is what a Vulkan swapchain expects.

use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Analog stick values below this magnitude are ignored.
pub const PAD_DEAD_ZONE: f32 = 0.0015;
const PAD_MOVE_SCALE: f32 = 2.0;
const PAD_ROTATE_SCALE: f32 = 50.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CameraKind {
    /// Orbits the origin: translation applied after rotation.
    #[default]
    LookAt,
    /// Free-flying: rotation applied after translation.
    FirstPerson,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CameraKeys: u8 {
        const UP    = 1 << 0;
        const DOWN  = 1 << 1;
        const LEFT  = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    fov: f32,
    znear: f32,
    zfar: f32,
    kind: CameraKind,
    position: Vec3,
    rotation: Vec3,
    view_position: Vec4,
    movement_speed: f32,
    rotation_speed: f32,
    flip_y: bool,
    updated: bool,
    keys: CameraKeys,
    perspective: Mat4,
    view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov: 0.0,
            znear: 0.0,
            zfar: 0.0,
            kind: CameraKind::LookAt,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            view_position: Vec4::ZERO,
            movement_speed: 1.0,
            rotation_speed: 1.0,
            flip_y: false,
            updated: true,
            keys: CameraKeys::empty(),
            perspective: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn new(kind: CameraKind, flip_y: bool) -> Self {
        let mut cam = Self {
            kind,
            flip_y,
            ..Self::default()
        };
        cam.update_view_matrix();
        cam
    }

    pub fn set_perspective(&mut self, fov: f32, aspect: f32, znear: f32, zfar: f32) {
        self.fov = fov;
        self.znear = znear;
        self.zfar = zfar;
        self.update_perspective(aspect);
    }

    pub fn update_aspect_ratio(&mut self, aspect: f32) {
        self.update_perspective(aspect);
    }

    /// Applies held movement keys (first-person only) and rebuilds the view.
    pub fn update(&mut self, dt: f32) {
        self.updated = false;

        if self.kind == CameraKind::FirstPerson && self.is_moving() {
            let front = self.front();
            let right = front.cross(Vec3::Y).normalize();
            let step = dt * self.movement_speed;

            if self.keys.contains(CameraKeys::UP) {
                self.position += front * step;
            }
            if self.keys.contains(CameraKeys::DOWN) {
                self.position -= front * step;
            }
            if self.keys.contains(CameraKeys::LEFT) {
                self.position -= right * step;
            }
            if self.keys.contains(CameraKeys::RIGHT) {
                self.position += right * step;
            }
        }

        self.update_view_matrix();
    }

    /// Gamepad input: left stick moves, right stick turns. Returns whether
    /// anything changed. Look-at cameras ignore the pad.
    pub fn update_pad(&mut self, left: Vec2, right: Vec2, dt: f32) -> bool {
        if self.kind != CameraKind::FirstPerson {
            return false;
        }

        let front = self.front();
        let side = front.cross(Vec3::Y).normalize();
        let move_speed = dt * self.movement_speed * PAD_MOVE_SCALE;
        let rot_speed = dt * self.rotation_speed * PAD_ROTATE_SCALE;
        let mut changed = false;

        if let Some(amount) = stick_axis(left.y) {
            self.position -= front * amount * move_speed;
            changed = true;
        }
        if let Some(amount) = stick_axis(left.x) {
            self.position += side * amount * move_speed;
            changed = true;
        }
        if let Some(amount) = stick_axis(right.x) {
            self.rotation.y += amount * rot_speed;
            changed = true;
        }
        if let Some(amount) = stick_axis(right.y) {
            self.rotation.x -= amount * rot_speed;
            changed = true;
        }

        if changed {
            self.update_view_matrix();
        }
        changed
    }

    pub fn is_moving(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Set when the last recomputation changed a matrix.
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Reads and clears the updated flag.
    pub fn take_updated(&mut self) -> bool {
        std::mem::take(&mut self.updated)
    }

    pub fn perspective(&self) -> Mat4 {
        self.perspective
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn view_position(&self) -> Vec4 {
        self.view_position
    }

    pub fn near_clip(&self) -> f32 {
        self.znear
    }

    pub fn far_clip(&self) -> f32 {
        self.zfar
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn kind(&self) -> CameraKind {
        self.kind
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn keys(&self) -> CameraKeys {
        self.keys
    }

    pub fn set_keys(&mut self, keys: CameraKeys) {
        self.keys = keys;
    }

    pub fn keys_mut(&mut self) -> &mut CameraKeys {
        &mut self.keys
    }

    pub fn set_kind(&mut self, kind: CameraKind) {
        self.kind = kind;
        self.update_view_matrix();
    }

    pub fn set_flip_y(&mut self, flip_y: bool) {
        self.flip_y = flip_y;
        self.update_view_matrix();
    }

    pub fn set_movement_speed(&mut self, speed: f32) {
        self.movement_speed = speed;
    }

    pub fn set_rotation_speed(&mut self, speed: f32) {
        self.rotation_speed = speed;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_view_matrix();
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.update_view_matrix();
    }

    pub fn rotate(&mut self, delta: Vec3) {
        self.rotation += delta;
        self.update_view_matrix();
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
        self.update_view_matrix();
    }

    /// Unit vector the camera looks along.
    pub fn front(&self) -> Vec3 {
        let rx = self.rotation.x.to_radians();
        let ry = self.rotation.y.to_radians();
        Vec3::new(-rx.cos() * ry.sin(), rx.sin(), rx.cos() * ry.cos()).normalize()
    }

    fn update_perspective(&mut self, aspect: f32) {
        let previous = self.perspective;
        self.perspective = Mat4::perspective_rh(self.fov.to_radians(), aspect, self.znear, self.zfar);
        if self.flip_y {
            self.perspective.y_axis.y *= -1.0;
        }
        if self.perspective != previous {
            self.updated = true;
        }
    }

    fn update_view_matrix(&mut self) {
        let previous = self.view;
        let sign = if self.flip_y { -1.0 } else { 1.0 };

        let rotate = Mat4::from_rotation_x((self.rotation.x * sign).to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_z(self.rotation.z.to_radians());

        let mut translation = self.position;
        translation.y *= sign;
        let translate = Mat4::from_translation(translation);

        self.view = match self.kind {
            CameraKind::FirstPerson => rotate * translate,
            CameraKind::LookAt => translate * rotate,
        };
        self.view_position = self.position.extend(0.0) * Vec4::new(-1.0, 1.0, -1.0, 1.0);

        if self.view != previous {
            self.updated = true;
        }
    }
}

/// Dead-zone remap of one stick axis to a signed amount in (0, 1].
fn stick_axis(value: f32) -> Option<f32> {
    let magnitude = value.abs();
    if magnitude <= PAD_DEAD_ZONE {
        return None;
    }
    let amount = (magnitude - PAD_DEAD_ZONE) / (1.0 - PAD_DEAD_ZONE);
    Some(amount.copysign(value))
}
