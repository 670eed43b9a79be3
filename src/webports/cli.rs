//! CLI definitions for the webports command.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;
use std::path::PathBuf;

/// webports - ports package manager
#[derive(Parser)]
#[command(name = "webports")]
#[command(author, version, disable_version_flag = true)]
#[command(help_template = "{about-section}\n{usage-heading} {usage}\n\n{all-args}\n\n{after-help}")]
#[command(about = "webports - Build, install and publish ports for SDK toolchains.\n\n\
    Ports are directories with a pkg_info descriptor. Packages are built\n\
    per configuration (arch / toolchain / debug) and installed into the\n\
    toolchain's install root.\n\n\
    EXAMPLES:\n\
    \x20 webports list                    List installed packages\n\
    \x20 webports --all list -v           List every port with its version\n\
    \x20 webports install zlib            Install zlib (prebuilt or from source)\n\
    \x20 webports -t glibc build libpng   Build libpng and its dependencies\n\
    \x20 webports depends ports/libpng    Print transitive dependencies\n\
    \x20 webports --all clean             Remove all build output")]
#[command(after_help = "Package arguments are port names or port directories; with none\n\
    given, the current directory is used.\n\
    Settings are read from --config, $WEBPORTS_CONFIG, <root>/webports.toml\n\
    or the user config directory.")]
pub struct Cli {
    /// Print version
    #[arg(long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Verbosity: -v (info), -vv (debug), -vvv (trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log to file (default: webports.log next to binary)
    #[arg(short = 'l', long = "log", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Settings file
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Make builds verbose (exports VERBOSE=1 to the build script)
    #[arg(short = 'V', long = "verbose-build", global = true)]
    pub verbose_build: bool,

    /// Skip the SDK presence and version check
    #[arg(long, global = true)]
    pub skip_sdk_version_check: bool,

    /// Perform action on all known ports (or all installed packages)
    #[arg(long, global = true)]
    pub all: bool,

    /// Color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Force building the named packages even if stamps would skip them
    #[arg(short = 'f', long, global = true)]
    pub force: bool,

    /// Force building the named packages and all their dependencies
    #[arg(short = 'F', long = "force-all", global = true)]
    pub force_all: bool,

    /// Always build from source rather than downloading prebuilt packages
    #[arg(long, global = true)]
    pub from_source: bool,

    /// Disable automatic building of dependencies
    #[arg(long, global = true)]
    pub no_deps: bool,

    /// Log and skip disabled packages instead of failing
    #[arg(long, global = true)]
    pub ignore_disabled: bool,

    /// Toolchain (glibc, bionic, pnacl, clang-newlib, emscripten)
    #[arg(short = 't', long, global = true)]
    pub toolchain: Option<String>,

    /// Architecture (x86_64, i686, arm, pnacl, emscripten)
    #[arg(short = 'a', long, global = true)]
    pub arch: Option<String>,

    /// Debug configuration (release is the default)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Always,
    Never,
    Auto,
}

/// Package name(s) or directories.
#[derive(Args, Clone, Default)]
pub struct PkgArgs {
    /// Package names or port directories (default: current directory)
    pub packages: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List installed packages (all ports with --all)
    #[command(visible_alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the install receipt of an installed package
    Info {
        /// Package name
        package: String,
    },

    /// List contents of installed package(s)
    Contents(PkgArgs),

    /// Print complete list of package dependencies
    Depends(PkgArgs),

    /// Download sources for package(s)
    Download(PkgArgs),

    /// Verify dependency information for package(s)
    Check(PkgArgs),

    /// Build package(s)
    Build(PkgArgs),

    /// Install package(s)
    Install(PkgArgs),

    /// Uninstall package(s)
    Uninstall(PkgArgs),

    /// Clean package build artifacts
    Clean(PkgArgs),

    /// Update the patch file of package(s) from the source tree
    #[command(name = "updatepatch")]
    UpdatePatch(PkgArgs),

    /// Extract source archive for package(s)
    Extract(PkgArgs),

    /// Apply the port patch for package(s)
    Patch(PkgArgs),

    /// Write a prebuilt package index for binary packages
    Index {
        /// Index file to write
        #[arg(short, long)]
        output: PathBuf,
        /// URL prefix the packages will be served from
        #[arg(short = 'u', long)]
        url_base: String,
        /// Binary package archives
        #[arg(required = true)]
        archives: Vec<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        shell: CompletionShell,
    },
}
