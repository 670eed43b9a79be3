//! SDK location, version and the toolchain paths derived from them.
//!
//! Values not given in [`Settings`](crate::config::Settings) are probed with
//! the SDK's `tools/getos.py`. Probing happens once, when the [`Sdk`] is
//! detected; accessors report what could not be determined only when it is
//! actually needed, so commands that never touch the SDK still work without
//! one.

use crate::config::Settings;
use crate::configuration::Configuration;
use crate::error::{ConfigError, Result};
use crate::paths::Layout;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Minimum SDK version supported by the tool.
pub const MIN_SDK_VERSION: u32 = 37;

/// Install stamp directory relative to the install root.
const STAMP_SUBDIR: &[&str] = &["var", "lib", "npkg"];

/// Detected SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdk {
    root: Option<PathBuf>,
    version: Option<String>,
    platform: String,
    emscripten_root: Option<PathBuf>,
}

impl Sdk {
    /// SDK with explicitly known values.
    pub fn new(root: impl Into<PathBuf>, version: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            root: Some(root.into()),
            version: Some(version.into()),
            platform: platform.into(),
            emscripten_root: None,
        }
    }

    /// Set the emscripten root.
    pub fn with_emscripten_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.emscripten_root = Some(root.into());
        self
    }

    /// Resolve the SDK from settings, falling back to the conventional
    /// locations under the output directory and to `getos.py`.
    pub fn detect(settings: &Settings, layout: &Layout) -> Self {
        let root = settings.sdk_root.clone().or_else(|| {
            let local = layout.out_dir().join("nacl_sdk");
            local.is_dir().then_some(local)
        });

        let getos = root.as_ref().map(|r| r.join("tools").join("getos.py"));
        let version = settings
            .sdk_version
            .clone()
            .or_else(|| getos.as_deref().and_then(|g| run_getos(g, &["--sdk-version"])));
        let platform = settings
            .platform
            .clone()
            .or_else(|| getos.as_deref().and_then(|g| run_getos(g, &[])))
            .unwrap_or_else(|| host_platform().to_string());

        let emscripten_root = settings.emscripten_root.clone().or_else(|| {
            let local = layout.out_dir().join("emsdk").join("emscripten");
            local.is_dir().then_some(local)
        });

        debug!(
            "sdk: root={:?} version={:?} platform={}",
            root, version, platform
        );
        Self {
            root,
            version,
            platform,
            emscripten_root,
        }
    }

    /// SDK root directory.
    pub fn root(&self) -> Result<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| ConfigError::Environment("$NACL_SDK_ROOT not set".to_string()).into())
    }

    /// SDK version string (e.g. `49`).
    pub fn version(&self) -> Result<&str> {
        self.version.as_deref().ok_or_else(|| {
            ConfigError::Environment("unable to determine SDK version".to_string()).into()
        })
    }

    /// Host platform as the SDK names it.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// True if the SDK is at least `required`.
    pub fn is_at_least(&self, required: &str) -> Result<bool> {
        let current = parse_version(self.version()?)?;
        Ok(current >= parse_version(required)?)
    }

    /// Fail unless the SDK meets [`MIN_SDK_VERSION`].
    pub fn check(&self) -> Result<()> {
        let root = self.root()?;
        if !root.is_dir() {
            return Err(ConfigError::Environment(format!(
                "$NACL_SDK_ROOT does not exist: {}",
                root.display()
            ))
            .into());
        }
        if !self.is_at_least(&MIN_SDK_VERSION.to_string())? {
            return Err(ConfigError::Environment(format!(
                "this tool requires at least version {} of the SDK; found {}",
                MIN_SDK_VERSION,
                self.version()?
            ))
            .into());
        }
        Ok(())
    }

    /// Emscripten root directory.
    pub fn emscripten_root(&self) -> Result<&Path> {
        self.emscripten_root.as_deref().ok_or_else(|| {
            ConfigError::Environment("$EMSCRIPTEN not set and no local emsdk found".to_string())
                .into()
        })
    }

    /// Toolchain directory for `config`.
    pub fn toolchain_root(&self, config: &Configuration) -> Result<PathBuf> {
        if config.toolchain() == "emscripten" {
            return Ok(self.emscripten_root()?.to_path_buf());
        }
        let tc_dir = match config.toolchain() {
            "pnacl" | "clang-newlib" => format!("{}_pnacl", self.platform),
            _ => {
                let tc_arch = if config.arch() == "arm" { "arm" } else { "x86" };
                format!("{}_{}_{}", self.platform, tc_arch, config.libc())
            }
        };
        Ok(self.root()?.join("toolchain").join(tc_dir))
    }

    /// Install root for `config` (also the Install Lock directory).
    pub fn install_root(&self, config: &Configuration) -> Result<PathBuf> {
        let tc_dir = self.toolchain_root(config)?;
        Ok(match config.toolchain() {
            "emscripten" => tc_dir.join("system").join("local"),
            "pnacl" => tc_dir.join("le32-nacl").join("usr"),
            _ => tc_dir.join(format!("{}-nacl", config.arch())).join("usr"),
        })
    }

    /// Directory holding `<name>.info` / `<name>.list` for installed packages.
    pub fn install_stamp_root(&self, config: &Configuration) -> Result<PathBuf> {
        let mut root = self.install_root(config)?;
        root.extend(STAMP_SUBDIR);
        Ok(root)
    }

    /// Install stamp of `name`.
    pub fn install_stamp(&self, name: &str, config: &Configuration) -> Result<PathBuf> {
        Ok(self.install_stamp_root(config)?.join(format!("{}.info", name)))
    }

    /// Installed file list of `name`.
    pub fn list_file(&self, name: &str, config: &Configuration) -> Result<PathBuf> {
        Ok(self.install_stamp_root(config)?.join(format!("{}.list", name)))
    }

    /// Strip tool for `config`.
    pub fn strip_tool(&self, config: &Configuration) -> Result<PathBuf> {
        let bin = self.toolchain_root(config)?.join("bin");
        Ok(if config.toolchain() == "pnacl" {
            bin.join("pnacl-strip")
        } else {
            bin.join(format!("{}-nacl-strip", config.arch()))
        })
    }
}

fn parse_version(version: &str) -> Result<u32> {
    version.trim().parse().map_err(|_| {
        ConfigError::Environment(format!("invalid SDK version: {}", version)).into()
    })
}

fn run_getos(getos: &Path, args: &[&str]) -> Option<String> {
    match Command::new(getos).args(args).output() {
        Ok(out) if out.status.success() => {
            Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        Ok(out) => {
            warn!("{} {:?} failed: exit {:?}", getos.display(), args, out.status.code());
            None
        }
        Err(e) => {
            debug!("unable to run {}: {}", getos.display(), e);
            None
        }
    }
}

fn host_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "mac",
        "windows" => "win",
        _ => "linux",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sdk() -> Sdk {
        Sdk::new("/sdk", "49", "linux").with_emscripten_root("/emsdk/emscripten")
    }

    #[test]
    fn install_roots() {
        let sdk = sdk();
        let pnacl = Configuration::new(Some("pnacl"), Some("pnacl"), false).unwrap();
        assert_eq!(
            sdk.install_root(&pnacl).unwrap(),
            PathBuf::from("/sdk/toolchain/linux_pnacl/le32-nacl/usr")
        );

        let glibc = Configuration::new(Some("i686"), Some("glibc"), false).unwrap();
        assert_eq!(
            sdk.install_root(&glibc).unwrap(),
            PathBuf::from("/sdk/toolchain/linux_x86_glibc/i686-nacl/usr")
        );

        let newlib = Configuration::new(Some("arm"), Some("clang-newlib"), false).unwrap();
        assert_eq!(
            sdk.install_root(&newlib).unwrap(),
            PathBuf::from("/sdk/toolchain/linux_pnacl/arm-nacl/usr")
        );

        let em = Configuration::new(Some("emscripten"), None, false).unwrap();
        assert_eq!(
            sdk.install_root(&em).unwrap(),
            PathBuf::from("/emsdk/emscripten/system/local")
        );
    }

    #[test]
    fn stamp_paths() {
        let sdk = sdk();
        let cfg = Configuration::new(Some("pnacl"), None, false).unwrap();
        assert_eq!(
            sdk.install_stamp("zlib", &cfg).unwrap(),
            PathBuf::from("/sdk/toolchain/linux_pnacl/le32-nacl/usr/var/lib/npkg/zlib.info")
        );
        assert_eq!(
            sdk.strip_tool(&cfg).unwrap(),
            PathBuf::from("/sdk/toolchain/linux_pnacl/bin/pnacl-strip")
        );
    }

    #[test]
    fn version_compare() {
        let sdk = sdk();
        assert!(sdk.is_at_least("42").unwrap());
        assert!(sdk.is_at_least("49").unwrap());
        assert!(!sdk.is_at_least("50").unwrap());
        assert!(sdk.is_at_least("x").is_err());
    }

    #[test]
    fn missing_root() {
        let sdk = Sdk {
            root: None,
            version: None,
            platform: "linux".to_string(),
            emscripten_root: None,
        };
        assert!(sdk.root().is_err());
        assert!(sdk.version().is_err());
    }
}
