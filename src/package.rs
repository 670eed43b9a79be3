//! Descriptor-backed package data shared by source, binary and installed
//! packages.
//!
//! A [`Package`] wraps a validated [`PkgInfo`] and exposes typed accessors
//! for the recognised keys. Validation enforces the naming rules and the
//! consistency of the `DISABLED_*` keys:
//!
//! - `NAME` has no underscores and no uppercase characters
//! - `VERSION` has no underscores
//! - `DISABLED_LIBC` entries are known libcs
//! - `DISABLED_TOOLCHAIN` entries are `toolchain` or `toolchain/arch`
//! - `DISABLED_ARCH` entries are known arches
//! - `ARCH` and `DISABLED_ARCH` are exclusive, as are `LIBC` and
//!   `DISABLED_LIBC`

use crate::configuration::{Configuration, VALID_ARCHES, VALID_LIBC, VALID_TOOLCHAINS};
use crate::error::{FormatError, Result};
use crate::pkg_info::{PkgInfo, REQUIRED_KEYS, VALID_KEYS};
use colored::Colorize;
use serde::Serialize;

/// Build provenance keys recorded in binary packages and install stamps.
pub const EXTRA_KEYS: &[&str] = &[
    "BUILD_CONFIG",
    "BUILD_ARCH",
    "BUILD_TOOLCHAIN",
    "BUILD_SDK_VERSION",
    "BUILD_NACLPORTS_REVISION",
];

/// Provenance keys that must be present.
pub const REQUIRED_EXTRA_KEYS: &[&str] = &[
    "BUILD_CONFIG",
    "BUILD_ARCH",
    "BUILD_TOOLCHAIN",
    "BUILD_SDK_VERSION",
];

/// Keys accepted in binary package and install stamp descriptors.
pub fn installed_valid_keys() -> Vec<&'static str> {
    VALID_KEYS.iter().chain(EXTRA_KEYS).copied().collect()
}

/// Keys required in binary package and install stamp descriptors.
pub fn installed_required_keys() -> Vec<&'static str> {
    REQUIRED_KEYS.iter().chain(REQUIRED_EXTRA_KEYS).copied().collect()
}

/// Validated descriptor with typed accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// Where the descriptor came from, for messages
    origin: String,
    info: PkgInfo,
}

impl Package {
    /// Wrap and validate a parsed descriptor.
    pub fn new(info: PkgInfo, origin: impl Into<String>) -> Result<Self> {
        let pkg = Self {
            origin: origin.into(),
            info,
        };
        pkg.validate()?;
        Ok(pkg)
    }

    fn invalid(&self, what: String) -> FormatError {
        FormatError::Invalid(format!("{}: {}", self.origin, what))
    }

    /// Check naming rules and key consistency.
    pub fn validate(&self) -> Result<()> {
        for libc in self.disabled_libc() {
            if !VALID_LIBC.contains(&libc.as_str()) {
                return Err(self.invalid(format!("invalid libc: {}", libc)).into());
            }
        }

        for entry in self.disabled_toolchain() {
            let (toolchain, arch) = split_toolchain_entry(entry);
            if let Some(arch) = arch {
                if !VALID_ARCHES.contains(&arch) {
                    return Err(self.invalid(format!("invalid architecture: {}", arch)).into());
                }
            }
            if !VALID_TOOLCHAINS.contains(&toolchain) {
                return Err(self.invalid(format!("invalid toolchain: {}", toolchain)).into());
            }
        }

        for arch in self.disabled_arch() {
            if !VALID_ARCHES.contains(&arch.as_str()) {
                return Err(self.invalid(format!("invalid architecture: {}", arch)).into());
            }
        }

        let name = self.name();
        if name.contains('_') {
            return Err(self.invalid("package NAME cannot contain underscores".into()).into());
        }
        if name != name.to_lowercase() {
            return Err(self
                .invalid("package NAME cannot contain uppercase characters".into())
                .into());
        }
        if self.version().contains('_') {
            return Err(self.invalid("package VERSION cannot contain underscores".into()).into());
        }
        if !self.disabled_arch().is_empty() && self.arch().is_some() {
            return Err(self.invalid("contains both ARCH and DISABLED_ARCH".into()).into());
        }
        if !self.disabled_libc().is_empty() && self.libc().is_some() {
            return Err(self.invalid("contains both LIBC and DISABLED_LIBC".into()).into());
        }
        Ok(())
    }

    /// Descriptor origin (path or archive name).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Underlying descriptor.
    pub fn info(&self) -> &PkgInfo {
        &self.info
    }

    /// Mutable descriptor; callers must keep it valid.
    pub(crate) fn info_mut(&mut self) -> &mut PkgInfo {
        &mut self.info
    }

    /// NAME
    pub fn name(&self) -> &str {
        self.info.get_str("NAME").unwrap_or_default()
    }

    /// VERSION
    pub fn version(&self) -> &str {
        self.info.get_str("VERSION").unwrap_or_default()
    }

    pub fn url(&self) -> Option<&str> {
        self.info.get_str("URL").filter(|s| !s.is_empty())
    }

    pub fn sha1(&self) -> Option<&str> {
        self.info.get_str("SHA1").filter(|s| !s.is_empty())
    }

    pub fn archive_root(&self) -> Option<&str> {
        self.info.get_str("ARCHIVE_ROOT")
    }

    pub fn url_filename(&self) -> Option<&str> {
        self.info.get_str("URL_FILENAME").filter(|s| !s.is_empty())
    }

    pub fn license(&self) -> Option<&str> {
        self.info.get_str("LICENSE")
    }

    pub fn libc(&self) -> Option<&str> {
        self.info.get_str("LIBC").filter(|s| !s.is_empty())
    }

    pub fn build_os(&self) -> Option<&str> {
        self.info.get_str("BUILD_OS").filter(|s| !s.is_empty())
    }

    pub fn min_sdk_version(&self) -> Option<&str> {
        self.info.get_str("MIN_SDK_VERSION").filter(|s| !s.is_empty())
    }

    pub fn patch_name(&self) -> Option<&str> {
        self.info.get_str("PATCH_NAME").filter(|s| !s.is_empty())
    }

    pub fn depends(&self) -> &[String] {
        self.info.get_list("DEPENDS")
    }

    pub fn conflicts(&self) -> &[String] {
        self.info.get_list("CONFLICTS")
    }

    pub fn disabled_arch(&self) -> &[String] {
        self.info.get_list("DISABLED_ARCH")
    }

    pub fn disabled_libc(&self) -> &[String] {
        self.info.get_list("DISABLED_LIBC")
    }

    pub fn disabled_toolchain(&self) -> &[String] {
        self.info.get_list("DISABLED_TOOLCHAIN")
    }

    /// ARCH allow-list, None when unrestricted.
    pub fn arch(&self) -> Option<&[String]> {
        self.info.get("ARCH").and_then(|v| v.as_list())
    }

    /// `DISABLED` set to anything other than empty or `0`.
    pub fn is_disabled(&self) -> bool {
        self.info
            .get_str("DISABLED")
            .is_some_and(|v| !v.is_empty() && v != "0")
    }

    /// False when `TOOLCHAIN_INSTALL=0`: only the stamp is written on
    /// install.
    pub fn toolchain_install(&self) -> bool {
        self.info.get_str("TOOLCHAIN_INSTALL") != Some("0")
    }

    /// `'name' [config]`
    pub fn info_string(&self, config: &Configuration) -> String {
        format!("'{}' [{}]", self.name(), config)
    }
}

/// Split a `DISABLED_TOOLCHAIN` entry into toolchain and optional arch.
pub fn split_toolchain_entry(entry: &str) -> (&str, Option<&str>) {
    match entry.split_once('/') {
        Some((tc, arch)) => (tc, Some(arch)),
        None => (entry, None),
    }
}

/// Print a status heading: `<message> '<name>' [<config>] <suffix>`.
pub fn log_status(message: &str, name: &str, config: &Configuration, suffix: &str) {
    println!(
        "{} '{}' [{}] {}",
        message.green(),
        name.yellow(),
        config.to_string().blue(),
        suffix
    );
}

/// Build a configuration from a descriptor's BUILD_* provenance.
pub fn build_config(pkg: &Package) -> Result<Configuration> {
    let info = pkg.info();
    let arch = info.get_str("BUILD_ARCH");
    let toolchain = info.get_str("BUILD_TOOLCHAIN");
    let debug = info.get_str("BUILD_CONFIG") == Some("debug");
    Ok(Configuration::new(arch, toolchain, debug)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortsError;

    fn pkg(text: &str) -> Result<Package> {
        let info = PkgInfo::parse(text, "test/pkg_info", VALID_KEYS, REQUIRED_KEYS)?;
        Package::new(info, "test/pkg_info")
    }

    fn err_text(text: &str) -> String {
        match pkg(text) {
            Err(PortsError::Format(e)) => e.to_string(),
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn accessors() {
        let p = pkg("NAME=zlib\nVERSION=1.2.8\nDEPENDS=(a b)\nARCH=(arm)\nTOOLCHAIN_INSTALL=0\n")
            .unwrap();
        assert_eq!(p.name(), "zlib");
        assert_eq!(p.version(), "1.2.8");
        assert_eq!(p.depends(), ["a", "b"]);
        assert_eq!(p.arch().map(|a| a.len()), Some(1));
        assert!(!p.toolchain_install());
        assert!(!p.is_disabled());
        assert!(p.url().is_none());
    }

    #[test]
    fn naming_rules() {
        assert_eq!(
            err_text("NAME=my_pkg\nVERSION=1\n"),
            "test/pkg_info: package NAME cannot contain underscores"
        );
        assert_eq!(
            err_text("NAME=Zlib\nVERSION=1\n"),
            "test/pkg_info: package NAME cannot contain uppercase characters"
        );
        assert_eq!(
            err_text("NAME=zlib\nVERSION=1_2\n"),
            "test/pkg_info: package VERSION cannot contain underscores"
        );
    }

    #[test]
    fn disabled_key_validation() {
        assert!(err_text("NAME=a\nVERSION=1\nDISABLED_LIBC=(musl)\n").contains("invalid libc"));
        assert!(err_text("NAME=a\nVERSION=1\nDISABLED_TOOLCHAIN=(msvc)\n")
            .contains("invalid toolchain"));
        assert!(err_text("NAME=a\nVERSION=1\nDISABLED_TOOLCHAIN=(glibc/mips)\n")
            .contains("invalid architecture"));
        assert!(err_text("NAME=a\nVERSION=1\nARCH=(arm)\nDISABLED_ARCH=(i686)\n")
            .contains("both ARCH and DISABLED_ARCH"));
        assert!(err_text("NAME=a\nVERSION=1\nLIBC=glibc\nDISABLED_LIBC=(newlib)\n")
            .contains("both LIBC and DISABLED_LIBC"));
        assert!(pkg("NAME=a\nVERSION=1\nDISABLED_TOOLCHAIN=(glibc/arm pnacl)\n").is_ok());
    }

    #[test]
    fn provenance_config() {
        let text = "NAME=a\nVERSION=1\nBUILD_CONFIG=debug\nBUILD_ARCH=arm\n\
                    BUILD_TOOLCHAIN=glibc\nBUILD_SDK_VERSION=49\n";
        let keys = installed_valid_keys();
        let required = installed_required_keys();
        let info = PkgInfo::parse(text, "x", &keys, &required).unwrap();
        let p = Package::new(info, "x").unwrap();
        assert_eq!(build_config(&p).unwrap().to_string(), "arm/glibc/debug");
    }

    #[test]
    fn provenance_required() {
        let keys = installed_valid_keys();
        let required = installed_required_keys();
        let err = PkgInfo::parse("NAME=a\nVERSION=1\n", "x", &keys, &required).unwrap_err();
        assert!(matches!(err, FormatError::MissingKey { .. }));
    }
}
