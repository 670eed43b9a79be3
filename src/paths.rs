//! Filesystem layout of the ports tree and its output directory.
//!
//! ```text
//! <root>/
//! ├── build_tools/build_port.sh
//! ├── lib/prebuilt.txt          default package index
//! ├── ports/<name>/pkg_info
//! ├── ports/python_modules/<name>/pkg_info
//! └── out/
//!     ├── build/<name>/...      extracted sources, install staging
//!     ├── stamp/<name>/...      extract and patch stamps
//!     ├── packages/             built binary packages
//!     │   └── prebuilt/         packages downloaded from the index
//!     ├── publish/<abi>/        BSD pkg files
//!     ├── cache/                downloaded archives and git mirrors
//!     └── logs/                 per-build logs
//! ```

use std::path::{Path, PathBuf};

/// Directories (relative to the root) scanned for ports.
pub const PORT_DIRS: &[&str] = &["ports", "ports/python_modules"];

/// Ports tree and output directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    out_dir: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`, with output in `out_dir` or `<root>/out`.
    pub fn new(root: impl Into<PathBuf>, out_dir: Option<PathBuf>) -> Self {
        let root = root.into();
        let out_dir = out_dir.unwrap_or_else(|| root.join("out"));
        Self { root, out_dir }
    }

    /// Ports tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Output directory (also the Build Lock directory).
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Extracted sources and install staging.
    pub fn build_root(&self) -> PathBuf {
        self.out_dir.join("build")
    }

    /// Extract and patch stamps.
    pub fn stamp_root(&self) -> PathBuf {
        self.out_dir.join("stamp")
    }

    /// Built binary packages.
    pub fn packages_root(&self) -> PathBuf {
        self.out_dir.join("packages")
    }

    /// Binary packages downloaded from the index.
    pub fn prebuilt_root(&self) -> PathBuf {
        self.packages_root().join("prebuilt")
    }

    /// Published BSD pkg files.
    pub fn publish_root(&self) -> PathBuf {
        self.out_dir.join("publish")
    }

    /// Download cache.
    pub fn cache_root(&self) -> PathBuf {
        self.out_dir.join("cache")
    }

    /// Build logs.
    pub fn logs_root(&self) -> PathBuf {
        self.out_dir.join("logs")
    }

    /// Helper scripts.
    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("build_tools")
    }

    /// Default build command.
    pub fn build_script(&self) -> PathBuf {
        self.tools_dir().join("build_port.sh")
    }

    /// Default package index file.
    pub fn default_index(&self) -> PathBuf {
        self.root.join("lib").join("prebuilt.txt")
    }

    /// Directories scanned for ports.
    pub fn port_dirs(&self) -> Vec<PathBuf> {
        PORT_DIRS.iter().map(|d| self.root.join(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_out_dir() {
        let layout = Layout::new("/src/webports", None);
        assert_eq!(layout.out_dir(), Path::new("/src/webports/out"));
        assert_eq!(
            layout.prebuilt_root(),
            PathBuf::from("/src/webports/out/packages/prebuilt")
        );
        assert_eq!(
            layout.build_script(),
            PathBuf::from("/src/webports/build_tools/build_port.sh")
        );
        assert_eq!(layout.port_dirs().len(), 2);
    }

    #[test]
    fn explicit_out_dir() {
        let layout = Layout::new("/src", Some(PathBuf::from("/tmp/out")));
        assert_eq!(layout.stamp_root(), PathBuf::from("/tmp/out/stamp"));
    }
}
