//! Per-package commands.
//!
//! Each command runs once per named package, or for every known port
//! (every installed package for `contents` / `uninstall`) with `--all`.

use super::clean::clean_all;
use super::report;
use log::info;
use std::process::ExitCode;
use webports_lib::{
    Configuration, Context, Force, InstalledPackage, PortsError, Result, SourcePackage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgAction {
    Contents,
    Depends,
    Download,
    Check,
    Build,
    Install,
    Uninstall,
    Clean,
    UpdatePatch,
    Extract,
    Patch,
}

impl PkgAction {
    /// Actions that operate on installed packages rather than ports.
    fn on_installed(self) -> bool {
        matches!(self, PkgAction::Contents | PkgAction::Uninstall)
    }
}

/// Options shared by the per-package commands.
#[derive(Debug, Clone)]
pub struct PkgOptions {
    pub all: bool,
    pub force: Option<Force>,
    pub build_deps: bool,
    pub from_source: bool,
    pub ignore_disabled: bool,
    pub verbosity: u8,
}

/// Run `action` over the selected packages.
pub fn cmd_package(
    ctx: &Context,
    config: &Configuration,
    action: PkgAction,
    packages: Vec<String>,
    options: &PkgOptions,
) -> ExitCode {
    match run(ctx, config, action, packages, options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

fn run(
    ctx: &Context,
    config: &Configuration,
    action: PkgAction,
    packages: Vec<String>,
    options: &PkgOptions,
) -> Result<()> {
    if options.all {
        if action == PkgAction::Clean {
            return clean_all(ctx, config);
        }
        if action.on_installed() {
            for pkg in InstalledPackage::all(ctx.sdk(), config)? {
                skip_disabled(run_installed(ctx, &pkg, action, options), options)?;
            }
        } else {
            for port in ctx.storage().ports() {
                let pkg = SourcePackage::new(ctx, port, config.clone());
                skip_disabled(run_source(ctx, &pkg, action, options), options)?;
            }
        }
        return Ok(());
    }

    let names = if packages.is_empty() {
        vec![std::env::current_dir()?.display().to_string()]
    } else {
        packages
    };
    for name in &names {
        let result = if action.on_installed() {
            let name = installed_name(ctx, name);
            InstalledPackage::load(ctx.sdk(), &name, config)
                .and_then(|pkg| run_installed(ctx, &pkg, action, options))
        } else {
            ctx.package(name, config)
                .and_then(|pkg| run_source(ctx, &pkg, action, options))
        };
        skip_disabled(result, options)?;
    }
    Ok(())
}

/// A port directory names the installed package of the same port.
fn installed_name(ctx: &Context, name_or_path: &str) -> String {
    ctx.storage()
        .resolve(name_or_path)
        .map(|p| p.name().to_string())
        .unwrap_or_else(|_| name_or_path.to_string())
}

fn skip_disabled(result: Result<()>, options: &PkgOptions) -> Result<()> {
    match result {
        Err(e) if options.ignore_disabled && e.is_disabled() => {
            info!("skipping disabled package: {}", e);
            println!("webports: {}", e);
            Ok(())
        }
        other => other,
    }
}

fn run_installed(
    ctx: &Context,
    pkg: &InstalledPackage<'_>,
    action: PkgAction,
    options: &PkgOptions,
) -> Result<()> {
    match action {
        PkgAction::Contents => {
            let root = ctx.sdk().install_root(pkg.config())?;
            for file in pkg.files()? {
                let mut line = if options.verbosity > 0 {
                    root.join(&file).display().to_string()
                } else {
                    file
                };
                if options.all {
                    line = format!("{}: {}", pkg.name(), line);
                }
                println!("{}", line);
            }
            Ok(())
        }
        PkgAction::Uninstall => pkg.uninstall(),
        other => Err(PortsError::msg(format!(
            "{:?} does not apply to installed packages",
            other
        ))),
    }
}

fn run_source(
    ctx: &Context,
    pkg: &SourcePackage<'_>,
    action: PkgAction,
    options: &PkgOptions,
) -> Result<()> {
    match action {
        PkgAction::Depends => {
            for dep in pkg.transitive_dependencies()? {
                println!("{}", dep.name());
            }
            Ok(())
        }
        PkgAction::Download => pkg.download(None),
        PkgAction::Check => {
            info!("Checking deps for {} ..", pkg.name());
            let problems = ctx.storage().check_port(pkg.port());
            if problems.is_empty() {
                Ok(())
            } else {
                Err(PortsError::msg(problems.join("\n")))
            }
        }
        PkgAction::Build => pkg.build(options.build_deps, options.force),
        PkgAction::Install => {
            if options.all {
                for conflict in pkg.transitive_conflicts()? {
                    if conflict.is_any_version_installed()? {
                        conflict.installed_package()?.uninstall()?;
                    }
                }
            }
            pkg.install(options.build_deps, options.force, options.from_source)
        }
        PkgAction::Clean => pkg.clean(),
        PkgAction::UpdatePatch => pkg.update_patch().map(|_| ()),
        PkgAction::Extract => {
            pkg.download(None)?;
            pkg.extract()
        }
        PkgAction::Patch => pkg.patch(),
        PkgAction::Contents | PkgAction::Uninstall => Err(PortsError::msg(format!(
            "{:?} applies to installed packages",
            action
        ))),
    }
}
