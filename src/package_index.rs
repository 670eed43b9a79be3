//! Index of prebuilt binary packages.
//!
//! An index file is a sequence of descriptor blocks separated by blank
//! lines. Each block is the binary package's `pkg_info` followed by
//! `BIN_URL`, `BIN_SIZE` and `BIN_SHA1`. Blocks are keyed by
//! (name, configuration); a repeated key is a [`FormatError`].

use crate::binary_package::BinaryPackage;
use crate::configuration::Configuration;
use crate::error::{FormatError, PortsError, Result};
use crate::fetch::Fetcher;
use crate::package::{EXTRA_KEYS, REQUIRED_EXTRA_KEYS};
use crate::pkg_info::{PkgInfo, REQUIRED_KEYS, VALID_KEYS};
use crate::sdk::Sdk;
use crate::util;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Keys appended to each block by [`write_index`].
pub const BIN_KEYS: &[&str] = &["BIN_URL", "BIN_SIZE", "BIN_SHA1"];

fn valid_keys() -> Vec<&'static str> {
    VALID_KEYS.iter().chain(EXTRA_KEYS).chain(BIN_KEYS).copied().collect()
}

fn required_keys() -> Vec<&'static str> {
    REQUIRED_KEYS
        .iter()
        .chain(REQUIRED_EXTRA_KEYS)
        .chain(BIN_KEYS)
        .copied()
        .collect()
}

/// Parsed package index.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    source: String,
    packages: BTreeMap<(String, Configuration), PkgInfo>,
}

impl PackageIndex {
    /// Parse index text; `source` names it in error messages.
    pub fn parse(text: &str, source: &str) -> Result<Self> {
        let keys = valid_keys();
        let required = required_keys();
        let mut packages = BTreeMap::new();

        for block in text.split("\n\n") {
            if block.trim().is_empty() {
                continue;
            }
            let info = PkgInfo::parse(block, source, &keys, &required)?;
            let config = Configuration::new(
                info.get_str("BUILD_ARCH"),
                info.get_str("BUILD_TOOLCHAIN"),
                info.get_str("BUILD_CONFIG") == Some("debug"),
            )?;
            let name = info.get_str("NAME").unwrap_or_default().to_string();
            if packages.contains_key(&(name.clone(), config.clone())) {
                return Err(FormatError::Invalid(format!(
                    "package index contains duplicate: {} [{}]",
                    name, config
                ))
                .into());
            }
            packages.insert((name, config), info);
        }

        debug!("index {}: {} packages", source, packages.len());
        Ok(Self {
            source: source.to_string(),
            packages,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Entry for `name` in `config`.
    pub fn get(&self, name: &str, config: &Configuration) -> Option<&PkgInfo> {
        self.packages.get(&(name.to_string(), config.clone()))
    }

    pub fn contains(&self, name: &str, config: &Configuration) -> bool {
        self.get(name, config).is_some()
    }

    /// Present and built with the current SDK version.
    pub fn installable(&self, name: &str, config: &Configuration, sdk: &Sdk) -> Result<bool> {
        let Some(info) = self.get(name, config) else {
            return Ok(false);
        };
        let built = info.get_str("BUILD_SDK_VERSION").unwrap_or_default();
        let current = sdk.version()?;
        if built != current {
            debug!(
                "Prebuilt package was built with different SDK version: {} vs {}",
                built, current
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Fetch the prebuilt archive into `prebuilt_root`, reusing a cached
    /// copy whose SHA1 verifies.
    pub fn download(
        &self,
        name: &str,
        config: &Configuration,
        prebuilt_root: &Path,
        fetcher: &dyn Fetcher,
    ) -> Result<PathBuf> {
        let info = self.get(name, config).ok_or_else(|| {
            PortsError::msg(format!("package not in index {}: {} [{}]", self.source, name, config))
        })?;
        let url = info.get_str("BIN_URL").unwrap_or_default();
        let sha1 = info.get_str("BIN_SHA1").unwrap_or_default();
        let basename = url.rsplit('/').next().unwrap_or(url);
        fs::create_dir_all(prebuilt_root)?;
        let dest = prebuilt_root.join(basename);

        if dest.exists() && util::verify_hash(&dest, sha1).is_ok() {
            debug!("using cached prebuilt: {}", dest.display());
            return Ok(dest);
        }
        info!("Downloading prebuilt binary ...");
        fetcher.fetch(url, &dest)?;
        util::verify_hash(&dest, sha1)?;
        Ok(dest)
    }
}

/// Write an index for `binaries` (archive path, download URL) and return it
/// parsed. Written to a temp file and renamed into place.
pub fn write_index(path: &Path, binaries: &[(PathBuf, String)]) -> Result<PackageIndex> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    {
        let mut out = fs::File::create(&tmp)?;
        for (i, (archive, url)) in binaries.iter().enumerate() {
            let pkg = BinaryPackage::open(archive)?;
            let sha1 = util::hash_file(archive)?;
            let size = fs::metadata(archive)?.len();
            if i != 0 {
                out.write_all(b"\n")?;
            }
            out.write_all(pkg.info_text().as_bytes())?;
            if !pkg.info_text().ends_with('\n') {
                out.write_all(b"\n")?;
            }
            writeln!(out, "BIN_URL={}", url)?;
            writeln!(out, "BIN_SIZE={}", size)?;
            writeln!(out, "BIN_SHA1={}", sha1)?;
        }
    }
    fs::rename(&tmp, path)?;
    PackageIndex::from_file(path)
}
