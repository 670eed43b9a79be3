//! Downloading upstream archives and prebuilt packages.
//!
//! Network transport is delegated to a [`Fetcher`]. The default
//! [`CurlFetcher`] shells out to `curl`, downloading to a `.partial` file
//! that is renamed into place only once complete, so an interrupted
//! download never leaves a truncated file at the destination.

use crate::build_command::{append_log, redirect};
use crate::error::{BuildError, PortsError, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Downloads a URL to a local file.
pub trait Fetcher {
    /// Fetch `url` into `dest`, replacing any existing file.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;

    /// [`Fetcher::fetch`] with transfer output sent to a build log.
    fn fetch_logged(&self, url: &str, dest: &Path, log: Option<&Path>) -> Result<()> {
        append_log(log, &format!("Downloading: {}\n", url))?;
        self.fetch(url, dest)
    }
}

/// Default fetcher running `curl --fail --location`.
#[derive(Debug, Default, Clone)]
pub struct CurlFetcher {
    /// Suppress the progress meter
    pub quiet: bool,
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.fetch_logged(url, dest, None)
    }

    fn fetch_logged(&self, url: &str, dest: &Path, log: Option<&Path>) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = partial_path(dest);
        info!("Downloading: {}", url);

        let mut cmd = Command::new("curl");
        cmd.args(["--fail", "--location", "--output"]).arg(&partial);
        if self.quiet {
            cmd.arg("--silent");
        } else {
            cmd.arg("--progress-bar");
        }
        cmd.arg(url);
        debug!("running {:?}", cmd);
        append_log(log, &format!("Downloading: {}\n", url))?;
        redirect(&mut cmd, log)?;

        let status = cmd
            .status()
            .map_err(|_| BuildError::NotFound("curl".to_string()))?;
        if !status.success() {
            let _ = fs::remove_file(&partial);
            return Err(PortsError::msg(format!(
                "Error downloading file: {} (curl exit {:?})",
                url,
                status.code()
            )));
        }
        fs::rename(&partial, dest)?;
        Ok(())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Try each URL in turn, returning the first success or the last error.
pub fn fetch_first(fetcher: &dyn Fetcher, urls: &[String], dest: &Path, log: Option<&Path>) -> Result<()> {
    let mut last_err = None;
    for url in urls {
        match fetcher.fetch_logged(url, dest, log) {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!("download failed: {}: {}", url, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| PortsError::msg("no download URL")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recorder {
        ok_url: &'static str,
        seen: RefCell<Vec<String>>,
    }

    impl Fetcher for Recorder {
        fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            self.seen.borrow_mut().push(url.to_string());
            if url == self.ok_url {
                fs::write(dest, url)?;
                Ok(())
            } else {
                Err(PortsError::msg("404"))
            }
        }
    }

    #[test]
    fn partial_name() {
        assert_eq!(
            partial_path(Path::new("/cache/zlib.tar.gz")),
            PathBuf::from("/cache/zlib.tar.gz.partial")
        );
    }

    #[test]
    fn first_success_wins() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("f");
        let fetcher = Recorder {
            ok_url: "http://upstream/f",
            seen: RefCell::new(Vec::new()),
        };
        let urls = vec![
            "http://mirror/f".to_string(),
            "http://upstream/f".to_string(),
            "http://never/f".to_string(),
        ];
        fetch_first(&fetcher, &urls, &dest, None).unwrap();
        assert_eq!(fetcher.seen.borrow().len(), 2);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "http://upstream/f");
    }

    #[test]
    fn all_fail() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = Recorder {
            ok_url: "",
            seen: RefCell::new(Vec::new()),
        };
        let urls = vec!["http://a".to_string()];
        let err = fetch_first(&fetcher, &urls, &dir.path().join("f"), None).unwrap_err();
        assert_eq!(err.to_string(), "404");
    }

    #[test]
    fn attempts_recorded_in_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("build.log");
        let fetcher = Recorder {
            ok_url: "http://upstream/f",
            seen: RefCell::new(Vec::new()),
        };
        let urls = vec!["http://mirror/f".to_string(), "http://upstream/f".to_string()];
        fetch_first(&fetcher, &urls, &dir.path().join("f"), Some(&log)).unwrap();
        assert_eq!(
            fs::read_to_string(&log).unwrap(),
            "Downloading: http://mirror/f\nDownloading: http://upstream/f\n"
        );
    }
}
