//! Binary package archives: `.tar.gz` files holding a root `pkg_info`
//! descriptor (with build provenance) and the installed tree under
//! `payload/`.
//!
//! Installing moves the payload into the configuration's install root and
//! rewrites the build-time prefix `/naclports-dummydir` in the few file
//! kinds that embed absolute paths:
//!
//! | Files                                 | Why                       |
//! |---------------------------------------|---------------------------|
//! | `build-1*`                            | boost build scripts       |
//! | `lib/pkgconfig/*`, `share/pkgconfig/*`| pkg-config `.pc` files    |
//! | `bin/*-config`                        | `<foo>-config` scripts    |
//! | `*.la`                                | libtool archives          |
//! | `include/**.h`                        | headers                   |

use crate::configuration::Configuration;
use crate::error::{FormatError, PortsError, Result};
use crate::installed;
use crate::lock::InstallLock;
use crate::package::{self, installed_required_keys, installed_valid_keys, Package};
use crate::pkg_info::PkgInfo;
use crate::sdk::Sdk;
use crate::{archive, util};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, trace};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// Archive directory holding the installed tree.
pub const PAYLOAD_DIR: &str = "payload";

/// Prefix that packages are built against and relocated from.
pub const INSTALL_PREFIX: &str = "/naclports-dummydir";

/// Binary package file extension.
pub const PACKAGE_EXTENSION: &str = ".tar.gz";

const INFO_ENTRY: &str = "pkg_info";
const INSTALL_TMP: &str = "install_tmp";

/// An opened binary package archive.
#[derive(Debug, Clone)]
pub struct BinaryPackage {
    path: PathBuf,
    info_text: String,
    package: Package,
    config: Configuration,
}

impl BinaryPackage {
    /// Validate the archive and parse its descriptor.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PortsError::msg(format!(
                "package archive not found: {}",
                path.display()
            )));
        }
        let name = path.to_string_lossy();
        if !name.ends_with(PACKAGE_EXTENSION) {
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            return Err(PortsError::msg(format!("invalid file extension: {}", ext)));
        }

        let info_text = read_info(path)?.ok_or_else(|| {
            FormatError::Invalid("package does not contain pkg_info file".to_string())
        })?;
        let keys = installed_valid_keys();
        let required = installed_required_keys();
        let origin = path.display().to_string();
        let info = PkgInfo::parse(&info_text, &origin, &keys, &required)?;
        let package = Package::new(info, origin)?;
        let config = package::build_config(&package)?;
        Ok(Self {
            path: path.to_path_buf(),
            info_text,
            package,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
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

    /// Raw text of the embedded descriptor.
    pub fn info_text(&self) -> &str {
        &self.info_text
    }

    /// Built with the SDK version currently configured.
    pub fn is_installable(&self, sdk: &Sdk) -> Result<bool> {
        let built = self.package.info().get_str("BUILD_SDK_VERSION").unwrap_or_default();
        Ok(built == sdk.version()?)
    }

    /// Install under the Install Lock.
    pub fn install(&self, sdk: &Sdk, force: bool) -> Result<()> {
        let root = sdk.install_root(&self.config)?;
        fs::create_dir_all(&root)?;
        let _lock = InstallLock::acquire(&root)?;
        self.do_install(sdk, force)
    }

    /// Install assuming the Install Lock is already held.
    pub fn do_install(&self, sdk: &Sdk, force: bool) -> Result<()> {
        if installed::is_installed(sdk, self.name(), &self.config, None)? {
            return Err(PortsError::msg(format!(
                "package already installed: {}",
                self.package.info_string(&self.config)
            )));
        }
        if self.package.toolchain_install() {
            self.install_files(sdk, force)?;
        }
        let stamp = sdk.install_stamp(self.name(), &self.config)?;
        trace!("stamp: {}", stamp.display());
        util::write_stamp(&stamp, &self.info_text)
    }

    fn install_files(&self, sdk: &Sdk, force: bool) -> Result<()> {
        let dest = sdk.install_root(&self.config)?;
        let dest_tmp = dest.join(INSTALL_TMP);
        util::remove_tree(&dest_tmp)?;

        package::log_status("Installing", self.name(), &self.config, "");
        debug!("installing from: {}", self.path.display());
        fs::create_dir_all(&dest_tmp)?;

        let result = self.stage_and_move(&dest, &dest_tmp, force);
        util::remove_tree(&dest_tmp)?;
        let names = result?;

        let dest_str = dest.to_string_lossy();
        for name in names.iter().filter(|n| needs_relocation(n)) {
            let path = dest.join(name);
            if path.is_file() && !path.is_symlink() && util::relocate_file(&path, INSTALL_PREFIX, &dest_str)? {
                trace!("relocated: {}", name);
            }
        }

        let list: String = names.iter().map(|n| format!("{}\n", n)).collect();
        util::write_stamp(&sdk.list_file(self.name(), &self.config)?, &list)
    }

    fn stage_and_move(&self, dest: &Path, dest_tmp: &Path, force: bool) -> Result<Vec<String>> {
        let names = self.payload_names()?;

        if !force {
            for name in &names {
                let full = dest.join(name);
                if full.exists() || full.is_symlink() {
                    return Err(PortsError::msg(format!(
                        "file already exists: {}",
                        full.display()
                    )));
                }
            }
        }

        archive::unpack_tar(open_tar(&self.path)?, dest_tmp)?;
        let payload = dest_tmp.join(PAYLOAD_DIR);
        let names = filter_out_executables(names, &payload);
        for name in &names {
            install_file(name, &payload, dest)?;
        }
        Ok(names)
    }

    /// Payload file names relative to `payload/`.
    fn payload_names(&self) -> Result<Vec<String>> {
        let mut tar = tar::Archive::new(open_tar(&self.path)?);
        let mut names = Vec::new();
        for entry in tar.entries()? {
            let entry = entry?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let raw = entry.path()?.into_owned();
            let name = normalize_entry(&raw).ok_or_else(|| {
                FormatError::Invalid(format!("invalid file in package: {}", raw.display()))
            })?;
            if name == INFO_ENTRY {
                continue;
            }
            match name.strip_prefix(&format!("{}/", PAYLOAD_DIR)) {
                Some(rest) if !rest.is_empty() => names.push(rest.to_string()),
                _ => {
                    return Err(FormatError::Invalid(format!("invalid file in package: {}", name)).into())
                }
            }
        }
        Ok(names)
    }

    /// Write a binary package from a staging tree and descriptor text.
    pub fn create(payload_dir: &Path, info_text: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = dest.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
            builder.follow_symlinks(false);

            let mut header = tar::Header::new_gnu();
            header.set_size(info_text.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, INFO_ENTRY, info_text.as_bytes())?;

            if payload_dir.is_dir() {
                builder.append_dir_all(PAYLOAD_DIR, payload_dir)?;
            }
            builder.into_inner()?.finish()?;
        }
        fs::rename(&tmp, dest)?;
        debug!("created {}", dest.display());
        Ok(())
    }
}

fn open_tar(path: &Path) -> Result<GzDecoder<BufReader<File>>> {
    Ok(GzDecoder::new(BufReader::new(File::open(path)?)))
}

/// Text of the root `pkg_info` entry, if present.
fn read_info(path: &Path) -> Result<Option<String>> {
    let mut tar = tar::Archive::new(open_tar(path)?);
    let entries = tar
        .entries()
        .map_err(|e| FormatError::Invalid(format!("{}: {}", path.display(), e)))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| FormatError::Invalid(format!("{}: {}", path.display(), e)))?;
        let raw = entry.path()?.into_owned();
        if normalize_entry(&raw).as_deref() == Some(INFO_ENTRY) {
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// `./a/b` -> `a/b`; None for absolute or parent-relative names.
fn normalize_entry(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Drop extension-less ELF files in `bin/`: they cannot run on the host and
/// the toolchain `bin` is on PATH during builds.
pub fn filter_out_executables(names: Vec<String>, root: &Path) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| {
            let path = Path::new(name);
            let in_bin = path.parent() == Some(Path::new("bin"));
            !(in_bin && path.extension().is_none() && util::is_elf_file(&root.join(name)))
        })
        .collect()
}

/// Whether `name` may embed the build prefix.
pub fn needs_relocation(name: &str) -> bool {
    name.starts_with("build-1")
        || name.starts_with("lib/pkgconfig")
        || name.starts_with("share/pkgconfig")
        || (name.starts_with("bin") && name.ends_with("-config"))
        || name.ends_with(".la")
        || (name.starts_with("include/") && name.ends_with(".h"))
}

fn install_file(name: &str, old_root: &Path, new_root: &Path) -> Result<()> {
    trace!("install: {}", name);
    let old = old_root.join(name);
    let new = new_root.join(name);
    if let Some(parent) = new.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(&old, &new)?;
    if util::is_elf_file(&new) || util::is_pexe_file(&new) {
        util::clear_exec_bits(&new)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INFO: &str = "NAME=zlib\nVERSION=1.2.8\nBUILD_CONFIG=release\n\
                        BUILD_ARCH=pnacl\nBUILD_TOOLCHAIN=pnacl\nBUILD_SDK_VERSION=49\n";

    fn make_package(dir: &Path) -> PathBuf {
        let payload = dir.join("stage");
        fs::create_dir_all(payload.join("lib/pkgconfig")).unwrap();
        fs::create_dir_all(payload.join("bin")).unwrap();
        fs::write(payload.join("lib/libz.a"), "archive").unwrap();
        fs::write(
            payload.join("lib/pkgconfig/zlib.pc"),
            "prefix=/naclports-dummydir\n",
        )
        .unwrap();
        fs::write(payload.join("bin/zpipe"), b"\x7fELF\x01").unwrap();
        let out = dir.join("zlib_1.2.8_pnacl.tar.gz");
        BinaryPackage::create(&payload, INFO, &out).unwrap();
        out
    }

    #[test]
    fn open_reads_descriptor() {
        let dir = TempDir::new().unwrap();
        let path = make_package(dir.path());
        let pkg = BinaryPackage::open(&path).unwrap();
        assert_eq!(pkg.name(), "zlib");
        assert_eq!(pkg.config().to_string(), "pnacl/release");
        assert_eq!(pkg.info_text(), INFO);
        assert!(pkg.is_installable(&Sdk::new(dir.path(), "49", "linux")).unwrap());
        assert!(!pkg.is_installable(&Sdk::new(dir.path(), "50", "linux")).unwrap());
    }

    #[test]
    fn open_rejects_bad_archives() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.tar.gz");
        assert!(BinaryPackage::open(&missing)
            .unwrap_err()
            .to_string()
            .starts_with("package archive not found"));

        let wrong = dir.path().join("pkg.zip");
        fs::write(&wrong, "x").unwrap();
        assert_eq!(
            BinaryPackage::open(&wrong).unwrap_err().to_string(),
            "invalid file extension: .zip"
        );
    }

    #[test]
    fn install_relocates_and_filters() {
        let dir = TempDir::new().unwrap();
        let path = make_package(dir.path());
        let sdk = Sdk::new(dir.path().join("sdk"), "49", "linux");
        let pkg = BinaryPackage::open(&path).unwrap();
        pkg.install(&sdk, false).unwrap();

        let root = sdk.install_root(pkg.config()).unwrap();
        assert!(root.join("lib/libz.a").exists());
        assert!(!root.join("bin/zpipe").exists());
        assert!(!root.join(INSTALL_TMP).exists());
        let pc = fs::read_to_string(root.join("lib/pkgconfig/zlib.pc")).unwrap();
        assert_eq!(pc, format!("prefix={}\n", root.display()));

        let stamp = sdk.install_stamp("zlib", pkg.config()).unwrap();
        assert_eq!(fs::read_to_string(stamp).unwrap(), INFO);
        let list = fs::read_to_string(sdk.list_file("zlib", pkg.config()).unwrap()).unwrap();
        let mut lines: Vec<&str> = list.lines().collect();
        lines.sort();
        assert_eq!(lines, ["lib/libz.a", "lib/pkgconfig/zlib.pc"]);

        let err = pkg.install(&sdk, false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "package already installed: 'zlib' [pnacl/release]"
        );
    }

    #[test]
    fn install_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = make_package(dir.path());
        let sdk = Sdk::new(dir.path().join("sdk"), "49", "linux");
        let pkg = BinaryPackage::open(&path).unwrap();
        let root = sdk.install_root(pkg.config()).unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/libz.a"), "old").unwrap();

        let err = pkg.install(&sdk, false).unwrap_err();
        assert!(err.to_string().starts_with("file already exists: "));
        pkg.install(&sdk, true).unwrap();
        assert_eq!(fs::read_to_string(root.join("lib/libz.a")).unwrap(), "archive");
    }

    #[test]
    fn relocation_rules() {
        assert!(needs_relocation("lib/pkgconfig/zlib.pc"));
        assert!(needs_relocation("bin/freetype-config"));
        assert!(needs_relocation("lib/libz.la"));
        assert!(needs_relocation("include/SDL/SDL_config.h"));
        assert!(needs_relocation("build-1.2/x"));
        assert!(!needs_relocation("lib/libz.a"));
        assert!(!needs_relocation("share/doc/zlib.h"));
    }

    #[test]
    fn entry_names() {
        assert_eq!(normalize_entry(Path::new("./payload/a")).as_deref(), Some("payload/a"));
        assert_eq!(normalize_entry(Path::new("../x")), None);
    }
}
