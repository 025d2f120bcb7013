// SPDX-License-Identifier: CEPL-1.0
//! Asset directory resolution.
//!
//! Built once at startup and handed to whoever needs to load files; there is
//! no process-wide instance.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

pub const ASSETS_DIR: &str = "assets";
pub const SHADERS_DIR: &str = "shaders";
pub const RESOURCES_DIR: &str = "resources";

#[derive(Debug, Error)]
pub enum PathError {
    #[error("could not locate the running executable: {0}")]
    Executable(#[source] io::Error),
    #[error("executable path {0} has no parent directory")]
    NoParent(PathBuf),
    #[error("failed to mirror {from} into {to}: {source}")]
    Sync {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetPaths {
    exe_dir: PathBuf,
    assets: PathBuf,
}

impl AssetPaths {
    /// Uses `dir` as the assets root directly.
    pub fn with_assets_dir(dir: impl Into<PathBuf>) -> Self {
        let assets = dir.into();
        Self {
            exe_dir: assets.parent().map(Path::to_path_buf).unwrap_or_default(),
            assets,
        }
    }

    /// Resolves relative to the directory holding the running executable.
    pub fn from_executable(editor: bool) -> Result<Self, PathError> {
        let exe = std::env::current_exe()
            .and_then(fs::canonicalize)
            .map_err(PathError::Executable)?;
        let dir = exe.parent().ok_or_else(|| PathError::NoParent(exe.clone()))?;
        Self::resolve(dir, editor)
    }

    /// `<exe_dir>/assets` is what ships next to the binary. In a build tree
    /// (`target/<profile>/`) the workspace copy lives two levels up; that one
    /// is preferred in editor mode and is mirrored into the shipped location
    /// whenever it exists.
    pub fn resolve(exe_dir: &Path, editor: bool) -> Result<Self, PathError> {
        let app_assets = exe_dir.join(ASSETS_DIR);
        let editor_assets = exe_dir
            .parent()
            .and_then(Path::parent)
            .map(|root| root.join(ASSETS_DIR));

        let mut assets = app_assets.clone();
        if let Some(editor_assets) = editor_assets.filter(|p| p.is_dir()) {
            if editor {
                assets = editor_assets.clone();
            }
            let copied = sync_tree(&editor_assets, &app_assets)?;
            if copied > 0 {
                info!(
                    "synced {copied} asset file(s) {} -> {}",
                    editor_assets.display(),
                    app_assets.display()
                );
            }
        }

        debug!("assets dir = {}", assets.display());
        Ok(Self {
            exe_dir: exe_dir.to_path_buf(),
            assets,
        })
    }

    pub fn executable_dir(&self) -> &Path {
        &self.exe_dir
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets
    }

    pub fn shaders_dir(&self) -> PathBuf {
        self.assets.join(SHADERS_DIR)
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.assets.join(RESOURCES_DIR)
    }

    /// `<shaders>/<name>.<stage>.spv`
    pub fn shader_binary(&self, name: &str, stage: &str) -> PathBuf {
        self.shaders_dir().join(format!("{name}.{stage}.spv"))
    }
}

/// Recursively copies files from `from` into `to` when the destination is
/// missing or older. Returns how many files were written.
pub fn sync_tree(from: &Path, to: &Path) -> Result<usize, PathError> {
    let wrap = |source| PathError::Sync {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    fs::create_dir_all(to).map_err(wrap)?;

    let mut copied = 0;
    for entry in fs::read_dir(from).map_err(wrap)? {
        let entry = entry.map_err(wrap)?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if entry.file_type().map_err(wrap)?.is_dir() {
            copied += sync_tree(&src, &dst)?;
        } else if is_newer(&src, &dst).map_err(wrap)? {
            fs::copy(&src, &dst).map_err(wrap)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn is_newer(src: &Path, dst: &Path) -> io::Result<bool> {
    let dst_meta = match fs::metadata(dst) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    Ok(fs::metadata(src)?.modified()? > dst_meta.modified()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tern-paths-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn set_mtime(path: &Path, t: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(t)
            .unwrap();
    }

    #[test]
    fn subdirectories_hang_off_assets() {
        let paths = AssetPaths::with_assets_dir("/opt/game/assets");
        assert_eq!(paths.shaders_dir(), Path::new("/opt/game/assets/shaders"));
        assert_eq!(paths.resources_dir(), Path::new("/opt/game/assets/resources"));
        assert_eq!(
            paths.shader_binary("triangle", "vert"),
            Path::new("/opt/game/assets/shaders/triangle.vert.spv")
        );
        assert_eq!(paths.executable_dir(), Path::new("/opt/game"));
    }

    #[test]
    fn editor_mode_prefers_workspace_assets() {
        let root = scratch("editor");
        let exe_dir = root.join("target").join("debug");
        fs::create_dir_all(&exe_dir).unwrap();
        fs::create_dir_all(root.join(ASSETS_DIR).join(SHADERS_DIR)).unwrap();
        fs::write(root.join("assets/shaders/a.vert.spv"), b"x").unwrap();

        let editor = AssetPaths::resolve(&exe_dir, true).unwrap();
        assert_eq!(editor.assets_dir(), root.join(ASSETS_DIR));

        let shipped = AssetPaths::resolve(&exe_dir, false).unwrap();
        assert_eq!(shipped.assets_dir(), exe_dir.join(ASSETS_DIR));
        // the workspace copy was mirrored next to the binary
        assert!(exe_dir.join("assets/shaders/a.vert.spv").is_file());

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn editor_mode_without_workspace_assets_falls_back() {
        let root = scratch("fallback");
        let exe_dir = root.join("target").join("release");
        fs::create_dir_all(&exe_dir).unwrap();

        let paths = AssetPaths::resolve(&exe_dir, true).unwrap();
        assert_eq!(paths.assets_dir(), exe_dir.join(ASSETS_DIR));

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn sync_only_copies_missing_or_newer_files() {
        let root = scratch("sync");
        let from = root.join("from");
        let to = root.join("to");
        fs::create_dir_all(from.join("nested")).unwrap();
        fs::write(from.join("a.txt"), b"new a").unwrap();
        fs::write(from.join("nested/b.txt"), b"new b").unwrap();

        assert_eq!(sync_tree(&from, &to).unwrap(), 2);
        assert_eq!(fs::read(to.join("nested/b.txt")).unwrap(), b"new b");

        // destination newer than source: left alone
        let now = SystemTime::now();
        fs::write(to.join("a.txt"), b"local edit").unwrap();
        set_mtime(&from.join("a.txt"), now - Duration::from_secs(60));
        set_mtime(&to.join("a.txt"), now);
        // source newer than destination: overwritten
        set_mtime(&to.join("nested/b.txt"), now - Duration::from_secs(60));
        set_mtime(&from.join("nested/b.txt"), now);
        fs::write(from.join("nested/b.txt"), b"newer b").unwrap();

        assert_eq!(sync_tree(&from, &to).unwrap(), 1);
        assert_eq!(fs::read(to.join("a.txt")).unwrap(), b"local edit");
        assert_eq!(fs::read(to.join("nested/b.txt")).unwrap(), b"newer b");

        fs::remove_dir_all(&root).unwrap();
    }
}
