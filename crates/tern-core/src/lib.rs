// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

pub mod arena;
pub mod paths;
pub mod slots;

pub use arena::{Arena, ArenaMarker};
pub use paths::{AssetPaths, PathError};
pub use slots::{Handle, Slots};

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}
