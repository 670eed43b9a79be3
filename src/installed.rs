//! Installed packages: install stamps, file lists and uninstall.
//!
//! Every installed package leaves two files in the configuration's install
//! stamp root (`<install root>/var/lib/npkg`):
//!
//! - `<name>.info` - the descriptor with build provenance (install stamp)
//! - `<name>.list` - installed paths relative to the install root
//!
//! Uninstall removes exactly the listed paths, prunes directories left
//! empty, and removes both files.

use crate::configuration::Configuration;
use crate::error::{PortsError, Result};
use crate::lock::InstallLock;
use crate::package::{self, installed_required_keys, installed_valid_keys, Package};
use crate::pkg_info::PkgInfo;
use crate::sdk::Sdk;
use crate::util;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// A package recorded as installed in a configuration.
#[derive(Debug, Clone)]
pub struct InstalledPackage<'a> {
    sdk: &'a Sdk,
    package: Package,
    config: Configuration,
}

impl<'a> InstalledPackage<'a> {
    /// Load from an install stamp.
    pub fn from_stamp(sdk: &'a Sdk, stamp: &Path) -> Result<Self> {
        let keys = installed_valid_keys();
        let required = installed_required_keys();
        let info = PkgInfo::parse_file(stamp, &keys, &required)?;
        let package = Package::new(info, stamp.display().to_string())?;
        let config = package::build_config(&package)?;
        Ok(Self {
            sdk,
            package,
            config,
        })
    }

    /// Load the installed package `name` in `config`.
    pub fn load(sdk: &'a Sdk, name: &str, config: &Configuration) -> Result<Self> {
        let stamp = sdk.install_stamp(name, config)?;
        if !stamp.exists() {
            return Err(PortsError::msg(format!(
                "package not installed: {} [{}]",
                name, config
            )));
        }
        Self::from_stamp(sdk, &stamp)
    }

    /// All packages installed in `config`, sorted by name.
    pub fn all(sdk: &'a Sdk, config: &Configuration) -> Result<Vec<Self>> {
        let root = sdk.install_stamp_root(config)?;
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut stamps: Vec<PathBuf> = fs::read_dir(&root)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "info"))
            .collect();
        stamps.sort();
        stamps.iter().map(|s| Self::from_stamp(sdk, s)).collect()
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }

    pub fn version(&self) -> &str {
        self.package.version()
    }

    /// Configuration the package was built for.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Installed paths relative to the install root.
    pub fn files(&self) -> Result<Vec<String>> {
        let list = self.sdk.list_file(self.name(), &self.config)?;
        if !list.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_to_string(&list)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Uninstall under the Install Lock.
    pub fn uninstall(&self) -> Result<()> {
        package::log_status("Uninstalling", self.name(), &self.config, "");
        let install_root = self.sdk.install_root(&self.config)?;
        let _lock = InstallLock::acquire(&install_root)?;
        self.do_uninstall()
    }

    /// Uninstall assuming the Install Lock is already held.
    pub fn do_uninstall(&self) -> Result<()> {
        let root = self.sdk.install_root(&self.config)?;
        let files = self.files()?;

        remove_file_and_empty_parents(&self.sdk.install_stamp(self.name(), &self.config)?, &root)?;

        for name in &files {
            let full = root.join(name);
            if !full.exists() && !full.is_symlink() {
                warn!("File not found while uninstalling: {}", full.display());
                continue;
            }
            debug!("uninstall: {}", name);
            remove_file_and_empty_parents(&full, &root)?;
        }

        let list = self.sdk.list_file(self.name(), &self.config)?;
        if list.exists() {
            remove_file_and_empty_parents(&list, &root)?;
        }
        Ok(())
    }
}

/// True if `name` is installed in `config`; with `expected`, only if the
/// stamp holds exactly that content.
pub fn is_installed(sdk: &Sdk, name: &str, config: &Configuration, expected: Option<&str>) -> Result<bool> {
    Ok(util::check_stamp(&sdk.install_stamp(name, config)?, expected))
}

/// Remove a file, then each parent directory that is left empty, stopping
/// at (and never removing) `root`.
pub fn remove_file_and_empty_parents(path: &Path, root: &Path) -> Result<()> {
    util::remove_file(path)?;
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        let is_empty = fs::read_dir(d).map(|mut it| it.next().is_none()).unwrap_or(false);
        if !is_empty {
            break;
        }
        fs::remove_dir(d)?;
        dir = d.parent();
    }
    Ok(())
}
