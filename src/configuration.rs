//! Build configuration: target architecture, toolchain, libc and debug flag.
//!
//! A [`Configuration`] is immutable once constructed. Its string form is used
//! in log file names, installed package stamps and user-facing messages:
//!
//! | arch    | toolchain | debug | Display                 |
//! |---------|-----------|-------|-------------------------|
//! | arm     | glibc     | yes   | `arm/glibc/debug`       |
//! | pnacl   | pnacl     | no    | `pnacl/release`         |
//! | x86_64  | clang-newlib | no | `x86_64/clang-newlib/release` |

use crate::error::ConfigError;
use serde::Serialize;
use std::fmt;

/// Accepted architectures.
pub const VALID_ARCHES: &[&str] = &["x86_64", "i686", "arm", "pnacl", "emscripten"];

/// Accepted toolchains.
pub const VALID_TOOLCHAINS: &[&str] = &["glibc", "bionic", "pnacl", "clang-newlib", "emscripten"];

/// Accepted values for `LIBC` / `DISABLED_LIBC`.
pub const VALID_LIBC: &[&str] = &["newlib", "glibc", "bionic"];

/// Environment variables consulted by [`Configuration::from_env`].
pub const ARCH_VAR: &str = "NACL_ARCH";
pub const TOOLCHAIN_VAR: &str = "TOOLCHAIN";
pub const DEBUG_VAR: &str = "NACL_DEBUG";

/// Target build configuration.
///
/// Field order drives the derived ordering: libc first, then toolchain,
/// then debug, with arch breaking ties so that `Eq`, `Ord` and `Hash` agree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Configuration {
    libc: String,
    toolchain: String,
    debug: bool,
    arch: String,
}

impl Configuration {
    /// Create a configuration, filling unset values with defaults.
    ///
    /// Toolchain defaults follow the arch (pnacl, emscripten) and otherwise
    /// fall back to pnacl. Arch defaults follow the toolchain, then the host.
    pub fn new(arch: Option<&str>, toolchain: Option<&str>, debug: bool) -> Result<Self, ConfigError> {
        let toolchain = match toolchain {
            Some(tc) => tc.to_string(),
            None => match arch {
                Some("pnacl") => "pnacl".to_string(),
                Some("emscripten") => "emscripten".to_string(),
                _ => "pnacl".to_string(),
            },
        };
        if !VALID_TOOLCHAINS.contains(&toolchain.as_str()) {
            return Err(ConfigError::InvalidToolchain(toolchain));
        }

        let arch = match arch {
            Some(a) => a.to_string(),
            None => default_arch(&toolchain).to_string(),
        };
        if !VALID_ARCHES.contains(&arch.as_str()) {
            return Err(ConfigError::InvalidArch(arch));
        }

        let libc = libc_for(&toolchain).to_string();
        Ok(Self {
            libc,
            toolchain,
            debug,
            arch,
        })
    }

    /// Like [`Configuration::new`], consulting `NACL_ARCH`, `TOOLCHAIN` and
    /// `NACL_DEBUG` for values not given explicitly.
    pub fn from_env(arch: Option<&str>, toolchain: Option<&str>, debug: bool) -> Result<Self, ConfigError> {
        let env_arch = std::env::var(ARCH_VAR).ok().filter(|s| !s.is_empty());
        let env_toolchain = std::env::var(TOOLCHAIN_VAR).ok().filter(|s| !s.is_empty());
        let env_debug = std::env::var(DEBUG_VAR).map(|v| v == "1").unwrap_or(false);

        Self::new(
            arch.or(env_arch.as_deref()),
            toolchain.or(env_toolchain.as_deref()),
            debug || env_debug,
        )
    }

    /// Target architecture.
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Toolchain name.
    pub fn toolchain(&self) -> &str {
        &self.toolchain
    }

    /// C library implied by the toolchain.
    pub fn libc(&self) -> &str {
        &self.libc
    }

    /// Debug build.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// `debug` or `release`.
    pub fn config_name(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "release"
        }
    }

    /// Architecture name used in package file names (`x86-64` for x86_64).
    pub fn package_arch(&self) -> &str {
        if self.arch == "x86_64" {
            "x86-64"
        } else {
            &self.arch
        }
    }

    /// Suffix shared by staging dirs and binary package names:
    /// `<pkgarch>[_<toolchain>][_debug]`. The toolchain is omitted when it is
    /// the same as the arch.
    pub fn package_suffix(&self) -> String {
        let mut suffix = self.package_arch().to_string();
        if self.arch != self.toolchain {
            suffix.push('_');
            suffix.push_str(&self.toolchain);
        }
        if self.debug {
            suffix.push_str("_debug");
        }
        suffix
    }

    /// Install staging directory name: `install_<suffix>`.
    pub fn install_dir_name(&self) -> String {
        format!("install_{}", self.package_suffix())
    }

    /// ABI directory name for published pkg files: `pkg_<toolchain>[_<pkgarch>]`.
    pub fn publish_abi(&self) -> String {
        if self.arch == self.toolchain {
            format!("pkg_{}", self.toolchain)
        } else {
            format!("pkg_{}_{}", self.toolchain, self.package_arch())
        }
    }

    /// Display string with `/` replaced, for use in file names.
    pub fn file_tag(&self) -> String {
        self.to_string().replace('/', "_")
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arch == self.toolchain {
            write!(f, "{}/{}", self.toolchain, self.config_name())
        } else {
            write!(f, "{}/{}/{}", self.arch, self.toolchain, self.config_name())
        }
    }
}

/// libc implied by a toolchain.
pub fn libc_for(toolchain: &str) -> &str {
    match toolchain {
        "pnacl" | "clang-newlib" => "newlib",
        other => other,
    }
}

fn default_arch(toolchain: &str) -> &'static str {
    match toolchain {
        "pnacl" => "pnacl",
        "emscripten" => "emscripten",
        "bionic" => "arm",
        _ => host_arch(),
    }
}

/// Host architecture mapped onto the supported arch names.
fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i686",
        _ => "x86_64",
    }
}
