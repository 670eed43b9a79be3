//! Settings file loading with environment overrides.
//!
//! Settings come from an optional TOML file. The first of these that exists
//! is used:
//!
//! 1. `--config <path>` on the command line
//! 2. `$WEBPORTS_CONFIG`
//! 3. `<ports root>/webports.toml`
//! 4. `<user config dir>/webports/config.toml`
//!
//! Environment variables then override the file:
//!
//! | Variable         | Setting        |
//! |------------------|----------------|
//! | `NACLPORTS_ROOT` | `ports_root`   |
//! | `NACL_SDK_ROOT`  | `sdk_root`     |
//! | `EMSCRIPTEN`     | `emscripten_root` |
//! | `FORCE_MIRROR`   | `force_mirror` |
//!
//! ```toml
//! ports_root = "/src/webports"
//! sdk_root = "/opt/nacl_sdk/pepper_49"
//! mirror_url = "https://storage.googleapis.com/naclports/mirror"
//! force_mirror = false
//! ```

use crate::error::ConfigError;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit settings file.
pub const CONFIG_VAR: &str = "WEBPORTS_CONFIG";

/// Settings file name looked up in the ports root.
pub const CONFIG_FILE: &str = "webports.toml";

/// Default mirror for upstream archives.
pub const DEFAULT_MIRROR_URL: &str = "https://storage.googleapis.com/naclports/mirror";

/// Tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Ports tree root (contains `ports/` and `build_tools/`)
    pub ports_root: Option<PathBuf>,
    /// Output directory, default `<ports root>/out`
    pub out_dir: Option<PathBuf>,
    /// SDK root, default `<out>/nacl_sdk`
    pub sdk_root: Option<PathBuf>,
    /// SDK version; probed with `tools/getos.py` when unset
    pub sdk_version: Option<String>,
    /// SDK platform name (`linux`, `mac`, `win`); probed when unset
    pub platform: Option<String>,
    /// Emscripten root, default `<out>/emsdk/emscripten`
    pub emscripten_root: Option<PathBuf>,
    /// Mirror consulted before upstream URLs
    pub mirror_url: String,
    /// Only download from the mirror
    pub force_mirror: bool,
    /// Prebuilt package index, default `<ports root>/lib/prebuilt.txt`
    pub index_file: Option<PathBuf>,
    /// Revision recorded as BUILD_NACLPORTS_REVISION
    pub revision: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ports_root: None,
            out_dir: None,
            sdk_root: None,
            sdk_version: None,
            platform: None,
            emscripten_root: None,
            mirror_url: DEFAULT_MIRROR_URL.to_string(),
            force_mirror: false,
            index_file: None,
            revision: None,
        }
    }
}

impl Settings {
    /// Load settings from the first available file, then apply environment
    /// overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match find_config_file(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("no settings file found, using defaults");
                Self::default()
            }
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Parse a TOML settings file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let settings: Settings = toml::from_str(&text).map_err(|e| ConfigError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("loaded settings from {}", path.display());
        trace!("settings: {:?}", settings);
        Ok(settings)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(root) = env_path("NACLPORTS_ROOT") {
            self.ports_root = Some(root);
        }
        if let Some(root) = env_path("NACL_SDK_ROOT") {
            self.sdk_root = Some(root);
        }
        if let Some(root) = env_path("EMSCRIPTEN") {
            self.emscripten_root = Some(root);
        }
        if let Ok(value) = std::env::var("FORCE_MIRROR") {
            self.force_mirror = is_truthy(&value);
        }
    }

    /// Ports root: the configured one or the current directory.
    pub fn ports_root(&self) -> PathBuf {
        self.ports_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Locate the settings file.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path(CONFIG_VAR) {
        return Some(path);
    }
    let root = env_path("NACLPORTS_ROOT").or_else(|| std::env::current_dir().ok());
    if let Some(candidate) = root.map(|r| r.join(CONFIG_FILE)) {
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    dirs::config_dir()
        .map(|d| d.join("webports").join("config.toml"))
        .filter(|p| p.is_file())
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
