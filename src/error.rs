//! Error types for the webports library.
//!
//! This module defines all error types used throughout the crate.
//! Uses `thiserror` for ergonomic error handling and automatic `Display` impl.
//!
//! # Error Hierarchy
//!
//! - [`PortsError`] - Top-level error enum, wraps all other errors
//! - [`FormatError`] - Malformed descriptor, index or package archive
//! - [`DisabledError`] - Package cannot be used in the current configuration
//! - [`ConflictError`] - Package conflicts with something already installed
//! - [`HashVerificationError`] - Downloaded file does not match its SHA1
//! - [`ConfigError`] - Invalid configuration or settings file
//! - [`LockError`] - Another process holds the build or install lock
//! - [`BuildError`] - External command failed
//! - [`GraphError`] - Unknown package or dependency cycle
//!
//! # Usage
//!
//! All public functions return [`Result<T>`] (`Result<T, PortsError>`).
//! Display strings are user-facing: the CLI prints them as-is.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PortsError>;

/// Top-level error type for the webports library.
///
/// Domain errors are displayed without a prefix so the CLI can print a
/// single readable line.
#[derive(Error, Debug)]
pub enum PortsError {
    /// Malformed descriptor, index or archive
    #[error("{0}")]
    Format(#[from] FormatError),

    /// Package disabled for the current configuration
    #[error("{0}")]
    Disabled(#[from] DisabledError),

    /// Conflict with an installed package
    #[error("{0}")]
    Conflict(#[from] ConflictError),

    /// Hash mismatch on a downloaded or cached file
    #[error("{0}")]
    HashVerification(#[from] HashVerificationError),

    /// Configuration error
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Lock contention
    #[error("{0}")]
    Lock(#[from] LockError),

    /// External command failure
    #[error("{0}")]
    Build(#[from] BuildError),

    /// Dependency graph error
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// Any other failure with a ready-made message
    #[error("{0}")]
    Msg(String),

    /// IO error (file operations)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PortsError {
    /// Shorthand for [`PortsError::Msg`].
    pub fn msg(message: impl Into<String>) -> Self {
        PortsError::Msg(message.into())
    }

    /// True when the underlying cause is a [`DisabledError`].
    pub fn is_disabled(&self) -> bool {
        matches!(self, PortsError::Disabled(_))
    }
}

/// Errors in descriptor, index or archive formats.
///
/// `file` names the descriptor source (a path or an archive member) so the
/// message points the user at the offending line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Line without a `=` separator
    #[error("Invalid info line {file}:{line}")]
    InvalidLine { file: String, line: usize },

    /// Key not in the accepted key set
    #[error("Invalid key '{key}' in info file {file}:{line}")]
    InvalidKey {
        key: String,
        file: String,
        line: usize,
    },

    /// Same key assigned twice
    #[error("Duplicate key '{key}' in info file {file}:{line}")]
    DuplicateKey {
        key: String,
        file: String,
        line: usize,
    },

    /// Required key absent
    #[error("Required key '{key}' missing from info file: '{file}'")]
    MissingKey { key: String, file: String },

    /// `KEY=(a b` without the closing parenthesis
    #[error("Unterminated list value {file}:{line}")]
    UnterminatedList { file: String, line: usize },

    /// Shell tokenisation failed (unbalanced quotes)
    #[error("Unable to parse value {file}:{line}: {reason}")]
    BadValue {
        file: String,
        line: usize,
        reason: String,
    },

    /// `$KEY` reference that cannot be resolved
    #[error("Error substituting '{reference}' in info file {file}:{line}")]
    BadSubstitution {
        reference: String,
        file: String,
        line: usize,
    },

    /// Free-form format problem (archives, descriptor semantics)
    #[error("{0}")]
    Invalid(String),
}

/// Reasons a package cannot be used in the current configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisabledError {
    /// `DISABLED=1`
    #[error("{package}: package is disabled")]
    Disabled { package: String },

    /// LIBC requirement or DISABLED_LIBC entry
    #[error("{package}: cannot be built with {libc}")]
    Libc { package: String, libc: String },

    /// DISABLED_TOOLCHAIN entry
    #[error("{package}: cannot be built with {toolchain}")]
    Toolchain { package: String, toolchain: String },

    /// DISABLED_TOOLCHAIN `toolchain/arch` entry
    #[error("{package}: cannot be built with {toolchain} for {arch}")]
    ToolchainArch {
        package: String,
        toolchain: String,
        arch: String,
    },

    /// DISABLED_ARCH entry or ARCH allow-list miss
    #[error("{package}: disabled for architecture: {arch}")]
    Arch { package: String, arch: String },

    /// MIN_SDK_VERSION above the current SDK
    #[error("{package}: requires SDK version {required} or above")]
    SdkVersion { package: String, required: String },

    /// BUILD_OS does not match the host platform
    #[error("{package}: can only be built on {os}")]
    BuildOs { package: String, os: String },

    /// A dependency is disabled
    #[error("{package} depends on {dependency}; {cause}")]
    Dependency {
        package: String,
        dependency: String,
        cause: Box<DisabledError>,
    },
}

impl DisabledError {
    /// Innermost reason, following dependency attribution.
    pub fn root_cause(&self) -> &DisabledError {
        match self {
            DisabledError::Dependency { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// Package conflicts with an installed package.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{package}: conflicts with installed package: {installed}")]
pub struct ConflictError {
    pub package: String,
    pub installed: String,
}

/// Content hash did not match the expected value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("hash verification failed for {}: expected {expected}, got {actual}", path.display())]
pub struct HashVerificationError {
    pub path: PathBuf,
    pub expected: String,
    pub actual: String,
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Unknown architecture
    #[error("Invalid arch: {0}")]
    InvalidArch(String),

    /// Unknown toolchain
    #[error("Invalid toolchain: {0}")]
    InvalidToolchain(String),

    /// Settings file could not be read or parsed
    #[error("{}: {reason}", path.display())]
    Settings { path: PathBuf, reason: String },

    /// Missing or broken SDK / environment setting
    #[error("{0}")]
    Environment(String),
}

/// Lock acquisition errors.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another process holds the lock
    #[error("Unable to acquire lock ({}): Is webports already running?", path.display())]
    Held { path: PathBuf },

    /// Lock file could not be created
    #[error("unable to create lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from external commands.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Command exited non-zero
    #[error("command failed: {command} (exit {code:?})")]
    CommandFailed {
        /// Command string
        command: String,
        /// Exit code (if available)
        code: Option<i32>,
    },

    /// Package build failed; output is in the log
    #[error("Building {package}: failed.")]
    PackageFailed { package: String },

    /// Command could not be started
    #[error("command not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dependency graph errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// No port with this name
    #[error("Package not found: {0}")]
    NotFound(String),

    /// Dependency cycle; the chain ends with the repeated package
    #[error("dependency cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },
}
