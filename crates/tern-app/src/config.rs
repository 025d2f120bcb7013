// SPDX-License-Identifier: CEPL-1.0
//! `tern.toml` loading. Every field has a default, so a partial or missing
//! file is fine; a malformed one is reported and ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tern_platform::WindowDesc;
use tern_render::RendererDesc;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG: &str = "tern.toml";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Overrides the resolved assets directory.
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowDesc,
    pub render: RendererDesc,
    pub assets: AssetsConfig,
}

impl AppConfig {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads `path`. A missing file is only worth a warning when the user
    /// named it explicitly.
    pub fn load(path: &Path, explicit: bool) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
                debug!("no {} found; using defaults", path.display());
                return Self::default();
            }
            Err(err) => {
                warn!("could not read {}: {err}; using defaults", path.display());
                return Self::default();
            }
        };

        match Self::parse(&text) {
            Ok(cfg) => {
                info!("loaded {}", path.display());
                cfg
            }
            Err(err) => {
                warn!("malformed {}: {err}; using defaults", path.display());
                Self::default()
            }
        }
    }
}
