//! Source packages: a port viewed in one configuration, and the pipeline
//! that turns it into an installed package.
//!
//! # Pipeline
//!
//! ```text
//! download -> extract -> patch -> build script -> binary package -> install
//!                                              \-> pkg file (publish)
//! ```
//!
//! Every step is idempotent through stamps ([`stamp`]) or output files:
//! a step whose recorded input matches the current input is skipped, and a
//! changed input on an existing tree is an error rather than a silent
//! overwrite.
//!
//! # Locations
//!
//! | What            | Where                                                   |
//! |-----------------|---------------------------------------------------------|
//! | Upstream archive| `out/cache/<URL_FILENAME or URL basename>`              |
//! | Source tree     | `out/build/<name>/<ARCHIVE_ROOT or name-version>`       |
//! | Install staging | `out/build/<name>/install_<suffix>/payload`             |
//! | Binary package  | `out/packages/<name>_<version>_<suffix>.tar.gz`         |
//! | Publish package | `out/publish/<abi>/<name>-<version>.txz`                |
//! | Build log       | `out/logs/<name>_<config>.log`                          |

pub mod git;
pub mod stamp;
pub mod update_patch;

use crate::binary_package::{BinaryPackage, PACKAGE_EXTENSION};
use crate::build_command::{self, BuildRequest};
use crate::configuration::{Configuration, ARCH_VAR, DEBUG_VAR, TOOLCHAIN_VAR};
use crate::context::Context;
use crate::error::{ConflictError, DisabledError, FormatError, PortsError, Result};
use crate::fetch;
use crate::installed::{self, InstalledPackage};
use crate::lock::{BuildLock, InstallLock};
use crate::package::{log_status, split_toolchain_entry, Package};
use crate::storage::Port;
use crate::{bsd_pkg, util};
use jwalk::WalkDir;
use log::{debug, info};
use stamp::Stamps;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;
use update_patch::PatchUpdate;

/// Default patch file name in a port directory.
pub const DEFAULT_PATCH: &str = "nacl.patch";

/// How far `--force` reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Force {
    /// Rebuild / reinstall the named packages
    Build,
    /// Also rebuild / reinstall every dependency
    All,
}

/// A port in one configuration.
#[derive(Clone)]
pub struct SourcePackage<'a> {
    ctx: &'a Context,
    port: &'a Port,
    config: Configuration,
}

impl std::fmt::Debug for SourcePackage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePackage")
            .field("name", &self.name())
            .field("config", &self.config)
            .finish()
    }
}

impl<'a> SourcePackage<'a> {
    pub fn new(ctx: &'a Context, port: &'a Port, config: Configuration) -> Self {
        Self { ctx, port, config }
    }

    fn with_port(&self, port: &'a Port) -> Self {
        Self::new(self.ctx, port, self.config.clone())
    }

    pub fn port(&self) -> &'a Port {
        self.port
    }

    pub fn package(&self) -> &'a Package {
        self.port.package()
    }

    pub fn name(&self) -> &'a str {
        self.port.name()
    }

    pub fn version(&self) -> &'a str {
        self.port.version()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Port directory.
    pub fn root(&self) -> &'a Path {
        self.port.root()
    }

    /// `'name' [config]`
    pub fn info_string(&self) -> String {
        self.package().info_string(&self.config)
    }

    fn log_status(&self, message: &str) {
        log_status(message, self.name(), &self.config, "");
    }

    // ---- locations ----

    /// Source tree location.
    pub fn build_location(&self) -> PathBuf {
        let dir = match self.package().archive_root() {
            Some(root) if !root.is_empty() => root.to_string(),
            _ => format!("{}-{}", self.name(), self.version()),
        };
        self.ctx.layout().build_root().join(self.name()).join(dir)
    }

    /// Install staging directory written by the build script.
    pub fn install_location(&self) -> PathBuf {
        self.ctx
            .layout()
            .build_root()
            .join(self.name())
            .join(self.config.install_dir_name())
            .join("payload")
    }

    pub fn patch_file(&self) -> PathBuf {
        self.root().join(self.package().patch_name().unwrap_or(DEFAULT_PATCH))
    }

    pub fn is_git_upstream(&self) -> bool {
        self.package().url().is_some_and(git::is_git_url)
    }

    /// Cache file name of the upstream archive.
    pub fn archive_filename(&self) -> Option<String> {
        if let Some(name) = self.package().url_filename() {
            return Some(name.to_string());
        }
        if self.is_git_upstream() {
            return None;
        }
        self.package().url().map(url_basename).filter(|n| !n.is_empty())
    }

    /// Where the upstream archive is cached.
    pub fn download_location(&self) -> Option<PathBuf> {
        self.archive_filename()
            .map(|f| self.ctx.layout().cache_root().join(f))
    }

    /// Binary package produced by a build.
    pub fn package_file(&self) -> PathBuf {
        self.ctx.layout().packages_root().join(format!(
            "{}_{}_{}{}",
            self.name(),
            self.version(),
            self.config.package_suffix(),
            PACKAGE_EXTENSION
        ))
    }

    /// Published pkg file.
    pub fn pkg_file(&self) -> PathBuf {
        self.ctx
            .layout()
            .publish_root()
            .join(self.config.publish_abi())
            .join(format!("{}-{}.txz", self.name(), self.version()))
    }

    /// Build log, or None when output goes to the console.
    pub fn log_file(&self) -> Option<PathBuf> {
        if self.ctx.verbosity() > 0 {
            return None;
        }
        Some(
            self.ctx
                .layout()
                .logs_root()
                .join(format!("{}_{}.log", self.name(), self.config.file_tag())),
        )
    }

    pub fn stamps(&self) -> Stamps {
        Stamps::new(&self.ctx.layout().stamp_root(), self.name())
    }

    // ---- graph ----

    pub fn dependencies(&self) -> Result<Vec<SourcePackage<'a>>> {
        let deps = self.ctx.storage().dependencies(self.name())?;
        Ok(deps.into_iter().map(|p| self.with_port(p)).collect())
    }

    pub fn transitive_dependencies(&self) -> Result<Vec<SourcePackage<'a>>> {
        let deps = self.ctx.storage().transitive_dependencies(self.name())?;
        Ok(deps.into_iter().map(|p| self.with_port(p)).collect())
    }

    pub fn conflicts(&self) -> Result<Vec<SourcePackage<'a>>> {
        let ports = self.ctx.storage().conflicts(self.name())?;
        Ok(ports.into_iter().map(|p| self.with_port(p)).collect())
    }

    pub fn transitive_conflicts(&self) -> Result<Vec<SourcePackage<'a>>> {
        let ports = self.ctx.storage().transitive_conflicts(self.name())?;
        Ok(ports.into_iter().map(|p| self.with_port(p)).collect())
    }

    pub fn reverse_dependencies(&self) -> Vec<SourcePackage<'a>> {
        self.ctx
            .storage()
            .reverse_dependencies(self.name())
            .into_iter()
            .map(|p| self.with_port(p))
            .collect()
    }

    // ---- checks ----

    /// Fail with [`DisabledError`] if this package or any dependency cannot
    /// be used in this configuration.
    pub fn check_installable(&self) -> Result<()> {
        // surfaces cycles before the recursive walk
        self.ctx.storage().transitive_dependencies(self.name())?;
        self.check_disabled()
    }

    fn check_disabled(&self) -> Result<()> {
        match self.disabled_reason(&mut HashMap::new())? {
            Some(cause) => Err(cause.into()),
            None => Ok(()),
        }
    }

    /// Why this package or one of its dependencies is disabled. Shared
    /// dependencies are evaluated once per walk through `seen`.
    fn disabled_reason(
        &self,
        seen: &mut HashMap<String, Option<DisabledError>>,
    ) -> Result<Option<DisabledError>> {
        if let Some(known) = seen.get(self.name()) {
            return Ok(known.clone());
        }
        let mut reason = match self.check_own() {
            Ok(()) => None,
            Err(PortsError::Disabled(cause)) => Some(cause),
            Err(other) => return Err(other),
        };
        if reason.is_none() {
            for dep in self.dependencies()? {
                if let Some(cause) = dep.disabled_reason(seen)? {
                    reason = Some(DisabledError::Dependency {
                        package: self.name().to_string(),
                        dependency: dep.name().to_string(),
                        cause: Box::new(cause),
                    });
                    break;
                }
            }
        }
        seen.insert(self.name().to_string(), reason.clone());
        Ok(reason)
    }

    fn check_own(&self) -> Result<()> {
        let pkg = self.package();
        let name = self.name().to_string();
        let config = &self.config;

        if pkg.is_disabled() {
            return Err(DisabledError::Disabled { package: name }.into());
        }
        let libc_disabled = pkg.libc().is_some_and(|l| l != config.libc())
            || pkg.disabled_libc().iter().any(|l| l == config.libc());
        if libc_disabled {
            return Err(DisabledError::Libc {
                package: name,
                libc: config.libc().to_string(),
            }
            .into());
        }
        for entry in pkg.disabled_toolchain() {
            match split_toolchain_entry(entry) {
                (toolchain, Some(arch)) => {
                    if config.arch() == arch && config.toolchain() == toolchain {
                        return Err(DisabledError::ToolchainArch {
                            package: name,
                            toolchain: toolchain.to_string(),
                            arch: arch.to_string(),
                        }
                        .into());
                    }
                }
                (toolchain, None) => {
                    if config.toolchain() == toolchain {
                        return Err(DisabledError::Toolchain {
                            package: name,
                            toolchain: toolchain.to_string(),
                        }
                        .into());
                    }
                }
            }
        }
        if pkg.disabled_arch().iter().any(|a| a == config.arch()) {
            return Err(DisabledError::Arch {
                package: name,
                arch: config.arch().to_string(),
            }
            .into());
        }
        if let Some(min) = pkg.min_sdk_version() {
            if !self.ctx.sdk().is_at_least(min)? {
                return Err(DisabledError::SdkVersion {
                    package: name,
                    required: min.to_string(),
                }
                .into());
            }
        }
        if let Some(arches) = pkg.arch() {
            if !arches.iter().any(|a| a == config.arch()) {
                return Err(DisabledError::Arch {
                    package: name,
                    arch: config.arch().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// [`Self::check_installable`] plus the host platform requirement.
    pub fn check_buildable(&self) -> Result<()> {
        self.check_installable()?;
        if let Some(os) = self.package().build_os() {
            if self.ctx.sdk().platform() != os {
                return Err(DisabledError::BuildOs {
                    package: self.name().to_string(),
                    os: os.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Fail with [`ConflictError`] if a conflicting package is installed.
    pub fn check_conflicts(&self) -> Result<()> {
        let sdk = self.ctx.sdk();
        for other in self.package().conflicts() {
            if installed::is_installed(sdk, other, &self.config, None)? {
                return Err(ConflictError {
                    package: self.name().to_string(),
                    installed: other.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    // ---- state ----

    /// Install stamp contents for this package: the port descriptor plus
    /// build provenance.
    pub fn installed_info_contents(&self) -> Result<String> {
        let mut text = fs::read_to_string(self.port.info_file())?;
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!("BUILD_CONFIG={}\n", self.config.config_name()));
        text.push_str(&format!("BUILD_ARCH={}\n", self.config.arch()));
        text.push_str(&format!("BUILD_TOOLCHAIN={}\n", self.config.toolchain()));
        text.push_str(&format!("BUILD_SDK_VERSION={}\n", self.ctx.sdk().version()?));
        if let Some(rev) = &self.ctx.settings().revision {
            text.push_str(&format!("BUILD_NACLPORTS_REVISION={}\n", rev));
        }
        Ok(text)
    }

    /// This exact build is installed.
    pub fn is_installed(&self) -> Result<bool> {
        let expected = self.installed_info_contents()?;
        installed::is_installed(self.ctx.sdk(), self.name(), &self.config, Some(&expected))
    }

    /// Some version of this package is installed.
    pub fn is_any_version_installed(&self) -> Result<bool> {
        installed::is_installed(self.ctx.sdk(), self.name(), &self.config, None)
    }

    pub fn installed_package(&self) -> Result<InstalledPackage<'a>> {
        InstalledPackage::load(self.ctx.sdk(), self.name(), &self.config)
    }

    /// The binary package exists, is well formed and matches the SDK.
    pub fn is_built(&self) -> Result<bool> {
        let file = self.package_file();
        if !file.exists() {
            return Ok(false);
        }
        match BinaryPackage::open(&file) {
            Ok(pkg) => pkg.is_installable(self.ctx.sdk()),
            Err(PortsError::Format(e)) => {
                debug!("treating malformed package as unbuilt: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // ---- pipeline ----

    /// Fetch upstream sources and verify them.
    ///
    /// `force_mirror` defaults to the settings value.
    pub fn download(&self, force_mirror: Option<bool>) -> Result<()> {
        self.do_download(force_mirror, None)
    }

    fn do_download(&self, force_mirror: Option<bool>, log: Option<&Path>) -> Result<()> {
        let Some(url) = self.package().url() else {
            return Ok(());
        };
        if self.is_git_upstream() {
            git::clone_to_mirror(&self.ctx.layout().cache_root(), url, log)?;
            return Ok(());
        }
        let Some(archive) = self.download_location() else {
            return Ok(());
        };
        let force_mirror = force_mirror.unwrap_or(self.ctx.settings().force_mirror);
        self.download_archive(&archive, force_mirror, log)?;

        let sha1 = self.package().sha1().ok_or_else(|| {
            FormatError::Invalid(format!(
                "missing SHA1 attribute: {}",
                self.port.info_file().display()
            ))
        })?;
        util::verify_hash(&archive, sha1)?;
        info!("verified: {}", archive.display());
        Ok(())
    }

    fn download_archive(&self, archive: &Path, force_mirror: bool, log: Option<&Path>) -> Result<()> {
        if archive.exists() {
            return Ok(());
        }
        let Some(filename) = self.archive_filename() else {
            return Ok(());
        };
        let mirror = self.ctx.settings().mirror_url.trim_end_matches('/');
        let mut urls = vec![format!("{}/{}", mirror, filename)];
        if !force_mirror {
            if let Some(url) = self.package().url() {
                urls.push(url.to_string());
            }
        }
        fetch::fetch_first(self.ctx.fetcher(), &urls, archive, log)
    }

    fn patch_sha1(&self) -> Result<Option<String>> {
        let patch = self.patch_file();
        if patch.exists() {
            Ok(Some(util::hash_file(&patch)?))
        } else {
            Ok(None)
        }
    }

    /// Expected extract stamp contents.
    pub fn extract_stamp_contents(&self) -> Result<String> {
        let patch = self.patch_sha1()?;
        if self.is_git_upstream() {
            let url = self.package().url().unwrap_or_default();
            return Ok(stamp::git_contents(url, patch.as_deref()));
        }
        let sha1 = self.package().sha1().unwrap_or("none");
        Ok(stamp::archive_contents(sha1, patch.as_deref()))
    }

    fn check_existing_tree(&self, dest: &Path, contents: &str) -> Result<bool> {
        if !dest.exists() {
            return Ok(false);
        }
        if util::check_stamp(&self.stamps().extract(), Some(contents)) {
            info!("Already up-to-date: {}", dest.display());
            return Ok(true);
        }
        Err(PortsError::msg(format!(
            "Upstream archive or patch has changed.\n\
             Please remove existing checkout and try again: '{}'",
            dest.display()
        )))
    }

    /// Unpack (or clone) upstream sources into the build location.
    pub fn extract(&self) -> Result<()> {
        self.do_extract(None)
    }

    fn do_extract(&self, log: Option<&Path>) -> Result<()> {
        if self.is_git_upstream() {
            return self.git_clone(log);
        }
        let Some(archive) = self.download_location() else {
            info!("Skipping extract; No upstream archive: {}", self.info_string());
            return Ok(());
        };

        let dest = self.build_location();
        let contents = self.extract_stamp_contents()?;
        if self.check_existing_tree(&dest, &contents)? {
            return Ok(());
        }

        self.log_status("Extracting");
        build_command::append_log(log, &format!("Extracting {}\n", archive.display()))?;
        let out_dir = self.ctx.layout().out_dir();
        fs::create_dir_all(out_dir)?;
        let tmp = tempfile::Builder::new().prefix("extract").tempdir_in(out_dir)?;
        self.ctx.extractor().extract(&archive, tmp.path())?;

        let folder = dest.file_name().unwrap_or_default();
        let src = tmp.path().join(folder);
        if !src.is_dir() {
            return Err(PortsError::msg(format!(
                "Archive contents not found: {}",
                src.display()
            )));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("renaming '{}' -> '{}'", src.display(), dest.display());
        fs::rename(&src, &dest)?;
        drop(tmp);

        let stamps = self.stamps();
        stamps.remove_all()?;
        stamps.write(&stamps.extract(), &contents)
    }

    fn git_clone(&self, log: Option<&Path>) -> Result<()> {
        let url = self.package().url().unwrap_or_default();
        let dest = self.build_location();
        let contents = self.extract_stamp_contents()?;
        if self.check_existing_tree(&dest, &contents)? {
            return Ok(());
        }

        self.log_status("Cloning");
        git::clone(&self.ctx.layout().cache_root(), url, &dest, log)?;

        let stamps = self.stamps();
        stamps.remove_all()?;
        stamps.write(&stamps.extract(), &contents)
    }

    /// Set up the two-branch layout and apply the port patch.
    ///
    /// Once patched, later calls only clean untracked files.
    pub fn patch(&self) -> Result<()> {
        self.do_patch(None)
    }

    fn do_patch(&self, log: Option<&Path>) -> Result<()> {
        if self.package().url().is_none() {
            return Ok(());
        }
        let stamps = self.stamps();
        let src = self.build_location();

        if stamps.patch().exists() {
            info!("Skipping patch step (cleaning source tree): {}", self.info_string());
            let mut args = vec!["clean", "-f", "-d"];
            if self.ctx.verbosity() == 0 {
                args.push("-q");
            }
            return build_command::run_command("git", &args, &src, log);
        }

        self.log_status("Patching");
        git::init_repo(&src, log)?;
        let patch = self.patch_file();
        if patch.exists() {
            debug!("applying patch to: {}", src.display());
            build_command::run_with_input(
                "patch",
                &["-p1", "-g0", "--no-backup-if-mismatch"],
                &src,
                File::open(&patch)?,
                log,
            )?;
            git::run_git(&src, &["add", "."], log)?;
            git::commit(&src, "Apply webports patch", log)?;
        }
        stamps.write(&stamps.patch(), "")
    }

    /// Environment handed to the build script.
    pub fn build_env(&self) -> Result<Vec<(String, String)>> {
        let sdk = self.ctx.sdk();
        let mut env = vec![
            (TOOLCHAIN_VAR.to_string(), self.config.toolchain().to_string()),
            (ARCH_VAR.to_string(), self.config.arch().to_string()),
            (
                DEBUG_VAR.to_string(),
                if self.config.debug() { "1" } else { "0" }.to_string(),
            ),
            ("NACL_SDK_ROOT".to_string(), sdk.root()?.display().to_string()),
        ];
        if self.config.toolchain() == "emscripten" {
            env.push(("EMSCRIPTEN".to_string(), sdk.emscripten_root()?.display().to_string()));
        }
        if self.ctx.verbose_build() {
            env.push(("VERBOSE".to_string(), "1".to_string()));
        }
        Ok(env)
    }

    /// Run the port's build script.
    pub fn run_build_sh(&self, log: Option<&Path>) -> Result<()> {
        let request = BuildRequest {
            package: self.name(),
            port_dir: self.root(),
            args: &[],
            env: self.build_env()?,
            log,
        };
        self.ctx.runner().run(&request)
    }

    /// Archive the install staging tree into the binary package unless the
    /// build script already produced it.
    pub fn package_binary(&self) -> Result<()> {
        let file = self.package_file();
        if file.exists() {
            return Ok(());
        }
        let contents = self.installed_info_contents()?;
        debug!("packaging {}", file.display());
        BinaryPackage::create(&self.install_location(), &contents, &file)
    }

    /// Write the publishable FreeBSD pkg file from the staging tree.
    pub fn create_pkg_file(&self) -> Result<()> {
        self.do_create_pkg_file(None)
    }

    fn do_create_pkg_file(&self, log: Option<&Path>) -> Result<()> {
        let install_dir = self.install_location();
        if !install_dir.exists() {
            info!(
                "Skipping pkg creation. Install dir not found: {}",
                install_dir.display()
            );
            return Ok(());
        }

        if !self.config.debug() && self.config.toolchain() != "emscripten" {
            self.strip_binaries(&install_dir, log)?;
        }

        let deps: &[String] = if self.config.toolchain() == "glibc" {
            self.package().depends()
        } else {
            &[]
        };
        bsd_pkg::create_pkg_file(
            self.name(),
            self.version(),
            self.config.arch(),
            &install_dir,
            &self.pkg_file(),
            deps,
            self.ctx.storage(),
        )
    }

    /// Strip ELF files (object files excepted).
    fn strip_binaries(&self, dir: &Path, log: Option<&Path>) -> Result<()> {
        let mut strip: Option<String> = None;
        for entry in WalkDir::new(dir).sort(true).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !util::is_elf_file(&path) || path.extension().is_some_and(|e| e == "o") {
                continue;
            }
            let tool = match &strip {
                Some(t) => t.clone(),
                None => {
                    let t = self.ctx.sdk().strip_tool(&self.config)?.display().to_string();
                    strip = Some(t.clone());
                    t
                }
            };
            info!("stripping: {} {}", tool, path.display());
            let path_str = path.to_string_lossy();
            build_command::run_command(&tool, &[&path_str], dir, log)?;
        }
        Ok(())
    }

    /// Install dependencies that are missing (all of them with
    /// [`Force::All`]).
    pub fn install_deps(&self, force: Option<Force>, from_source: bool) -> Result<()> {
        for dep in self.dependencies()? {
            if !dep.is_any_version_installed()? || force == Some(Force::All) {
                dep.install(true, force, from_source)?;
            }
        }
        Ok(())
    }

    /// Build the binary package.
    pub fn build(&self, build_deps: bool, force: Option<Force>) -> Result<()> {
        self.check_buildable()?;
        if build_deps {
            self.install_deps(force, false)?;
        }
        if force.is_none() && self.is_built()? {
            self.log_status("Already built");
            return Ok(());
        }

        self.log_status("Building");
        let log = self.log_file();
        if let Some(log) = &log {
            fs::create_dir_all(self.ctx.layout().logs_root())?;
            util::remove_file(log)?;
        }

        let start = Instant::now();
        {
            let out_dir = self.ctx.layout().out_dir();
            fs::create_dir_all(out_dir)?;
            let _lock = BuildLock::acquire(out_dir)?;
            if let Err(e) = self.build_steps(log.as_deref()) {
                if let Some(text) = log.as_ref().and_then(|l| fs::read_to_string(l).ok()) {
                    print!("{}", text);
                }
                return Err(e);
            }
        }
        let took = format!("[took {}]", util::format_time_delta(start.elapsed()));
        log_status("Build complete", self.name(), &self.config, &took);
        Ok(())
    }

    fn build_steps(&self, log: Option<&Path>) -> Result<()> {
        self.do_download(None, log)?;
        self.do_extract(log)?;
        self.do_patch(log)?;
        self.run_build_sh(log)?;
        self.package_binary()?;
        self.do_create_pkg_file(log)
    }

    /// Install, from a local build, a prebuilt or a fresh source build.
    pub fn install(&self, build_deps: bool, force: Option<Force>, from_source: bool) -> Result<()> {
        self.check_installable()?;
        self.check_conflicts()?;

        if force.is_none() && self.is_installed()? {
            self.log_status("Already installed");
            return Ok(());
        }
        if build_deps {
            self.install_deps(force, from_source)?;
        }

        let mut from_source = from_source || force.is_some();
        let mut package_file = self.package_file();
        if !from_source && !self.is_built()? {
            let index = self.ctx.index()?;
            if index.installable(self.name(), &self.config, self.ctx.sdk())? {
                package_file = index.download(
                    self.name(),
                    &self.config,
                    &self.ctx.layout().prebuilt_root(),
                    self.ctx.fetcher(),
                )?;
            } else {
                from_source = true;
            }
        }
        if from_source {
            self.build(build_deps, force)?;
        }

        let sdk = self.ctx.sdk();
        let root = sdk.install_root(&self.config)?;
        fs::create_dir_all(&root)?;
        let _lock = InstallLock::acquire(&root)?;
        if self.is_any_version_installed()? {
            let existing = self.installed_package()?;
            log_status("Uninstalling existing", existing.name(), existing.config(), "");
            existing.do_uninstall()?;
        }
        BinaryPackage::open(&package_file)?.do_install(sdk, force.is_some())
    }

    /// Remove the built archive and all stamps.
    pub fn clean(&self) -> Result<()> {
        let file = self.package_file();
        info!("removing {}", file.display());
        util::remove_file(&file)?;
        let stamps = self.stamps();
        info!("removing {}", stamps.dir().display());
        stamps.remove_all()
    }

    /// Regenerate the port patch from the source tree.
    pub fn update_patch(&self) -> Result<Option<PatchUpdate>> {
        if self.package().url().is_none() {
            return Ok(None);
        }
        let patch = self.patch_file();
        let result = update_patch::update_patch(&self.build_location(), self.root(), &patch)?;
        match result {
            PatchUpdate::Removed => info!("removing patch file: {}", patch.display()),
            PatchUpdate::NotRequired => info!("no patch required: {}", self.build_location().display()),
            PatchUpdate::Unchanged => info!("patch unchanged: {}", patch.display()),
            PatchUpdate::Created => info!("created patch: {}", patch.display()),
            PatchUpdate::Updated => info!("updated patch: {}", patch.display()),
        }
        Ok(Some(result))
    }
}

/// Last path segment of a URL, ignoring query and fragment.
fn url_basename(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let path = path.split_once('/').map_or("", |(_, p)| p);
    path.rsplit('/').next().unwrap_or_default().to_string()
}
