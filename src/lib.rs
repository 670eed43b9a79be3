//! webports: ports package manager for SDK toolchains.
//!
//! Builds, installs and publishes vendored third-party packages ("ports")
//! for a matrix of architectures, toolchains and build types.
//!
//! # Overview
//!
//! webports provides:
//!
//! - **Port descriptors** (`pkg_info` files) with a strict key set and
//!   `$KEY` substitution
//! - **Configurations** (arch / toolchain / debug) with derived paths
//! - **Dependency graphs** per configuration, with disabled-reason
//!   attribution and cycle detection
//! - **A stamp-driven pipeline**: download, extract, patch, build, package,
//!   install
//! - **Binary packages** with install-time relocation and exact uninstall
//! - **A prebuilt package index** and FreeBSD `pkg` publishing
//! - **Inter-process locks** around the build output and each install root
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CLI (webports)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Context: Settings │ Layout │ Sdk │ Storage │ collaborators │
//! ├───────────────┬─────────────────┬───────────────┬───────────┤
//! │ SourcePackage │  BinaryPackage  │ Installed     │ Index     │
//! ├───────────────┴─────────────────┴───────────────┴───────────┤
//! │  Package  │  PkgInfo  │  Configuration  │  Lock  │  Util    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use webports_lib::{Configuration, Context, Settings};
//!
//! let ctx = Context::from_settings(Settings::load(None)?)?;
//! let config = Configuration::from_env(None, None, false)?;
//!
//! let pkg = ctx.package("zlib", &config)?;
//! pkg.install(true, None, false)?;
//! ```
//!
//! # Modules
//!
//! - [`pkg_info`], [`token`] - descriptor parsing and substitution
//! - [`configuration`] - build configurations
//! - [`package`] - validated descriptors
//! - [`storage`] - port discovery and the dependency graph
//! - [`source`] - per-configuration pipeline
//! - [`binary_package`], [`installed`], [`package_index`] - package files and
//!   install state
//! - [`bsd_pkg`] - publish format
//! - [`lock`] - Build and Install locks
//! - [`config`], [`paths`], [`sdk`], [`context`] - settings and environment
//! - [`fetch`], [`build_command`], [`archive`] - external collaborators
//! - [`error`] - error types

pub mod archive;
pub mod binary_package;
pub mod bsd_pkg;
pub mod build_command;
pub mod config;
pub mod configuration;
pub mod context;
pub mod error;
pub mod fetch;
pub mod installed;
pub mod lock;
pub mod package;
pub mod package_index;
pub mod paths;
pub mod pkg_info;
pub mod sdk;
pub mod source;
pub mod storage;
pub mod token;
pub mod util;

// Re-exports for convenience
pub use binary_package::BinaryPackage;
pub use config::Settings;
pub use configuration::Configuration;
pub use context::Context;
pub use error::{
    BuildError, ConfigError, ConflictError, DisabledError, FormatError, GraphError,
    HashVerificationError, LockError, PortsError, Result,
};
pub use installed::InstalledPackage;
pub use package::Package;
pub use package_index::PackageIndex;
pub use pkg_info::PkgInfo;
pub use source::{Force, SourcePackage};
pub use storage::{Port, Storage};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
