//! Per-port stamp files under `out/stamp/<name>/`.
//!
//! Stamps are the only record of pipeline progress:
//!
//! | Stamp        | Content                                              |
//! |--------------|------------------------------------------------------|
//! | `extract`    | `ARCHIVE_SHA1=<hex>[ PATCH_SHA1=<hex>]` or `GITURL=<url>[ PATCH=<hex>]` |
//! | `nacl_patch` | empty                                                |

use crate::error::Result;
use crate::util;
use log::debug;
use std::path::{Path, PathBuf};

const EXTRACT: &str = "extract";
const PATCH: &str = "nacl_patch";

/// Stamp directory of one port.
#[derive(Debug, Clone)]
pub struct Stamps {
    dir: PathBuf,
}

impl Stamps {
    pub fn new(stamp_root: &Path, name: &str) -> Self {
        Self {
            dir: stamp_root.join(name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Written after a successful extract or clone.
    pub fn extract(&self) -> PathBuf {
        self.dir.join(EXTRACT)
    }

    /// Written after the patch is applied.
    pub fn patch(&self) -> PathBuf {
        self.dir.join(PATCH)
    }

    /// Drop every stamp of the port.
    pub fn remove_all(&self) -> Result<()> {
        util::remove_tree(&self.dir)
    }

    pub fn write(&self, path: &Path, contents: &str) -> Result<()> {
        util::write_stamp(path, contents)?;
        debug!("Wrote stamp: {}", path.display());
        Ok(())
    }
}

/// Extract stamp for an archive upstream.
pub fn archive_contents(sha1: &str, patch_sha1: Option<&str>) -> String {
    match patch_sha1 {
        Some(p) => format!("ARCHIVE_SHA1={} PATCH_SHA1={}\n", sha1, p),
        None => format!("ARCHIVE_SHA1={}\n", sha1),
    }
}

/// Extract stamp for a git upstream.
pub fn git_contents(url: &str, patch_sha1: Option<&str>) -> String {
    match patch_sha1 {
        Some(p) => format!("GITURL={} PATCH={}\n", url, p),
        None => format!("GITURL={}\n", url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn contents() {
        assert_eq!(archive_contents("abc", None), "ARCHIVE_SHA1=abc\n");
        assert_eq!(archive_contents("abc", Some("def")), "ARCHIVE_SHA1=abc PATCH_SHA1=def\n");
        assert_eq!(git_contents("https://h/r.git@1", Some("9")), "GITURL=https://h/r.git@1 PATCH=9\n");
    }

    #[test]
    fn remove_all() {
        let dir = TempDir::new().unwrap();
        let stamps = Stamps::new(dir.path(), "zlib");
        stamps.write(&stamps.patch(), "").unwrap();
        stamps.write(&stamps.extract(), "x").unwrap();
        assert!(stamps.patch().exists());
        stamps.remove_all().unwrap();
        assert!(!stamps.dir().exists());
    }
}
