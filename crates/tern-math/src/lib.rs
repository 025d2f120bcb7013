// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

pub mod camera;

pub use camera::{Camera, CameraKeys, CameraKind};
pub use glam::{Mat4, Vec2, Vec3, Vec4};
