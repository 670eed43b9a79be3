//! Upstream source archive extraction.
//!
//! | Extension           | Handler             |
//! |---------------------|---------------------|
//! | `.tar.gz`, `.tgz`   | tar + flate2        |
//! | `.tar.xz`, `.txz`   | tar + xz2           |
//! | `.tar`              | tar                 |
//! | `.zip`              | zip                 |
//! | `.tar.bz2`, `.tbz2` | system `tar xf`     |
//!
//! Anything else is rejected with "unhandled extension".

use crate::error::{BuildError, FormatError, PortsError, Result};
use log::debug;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::Command;
use zip::ZipArchive;

/// Archive formats understood by [`NativeExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarXz,
    TarBz2,
    Tar,
    Zip,
}

/// Detect archive format from file extension.
pub fn detect_format(path: &Path) -> Option<ArchiveFormat> {
    let name = path.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Some(ArchiveFormat::TarXz)
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        Some(ArchiveFormat::TarBz2)
    } else if name.ends_with(".tar") {
        Some(ArchiveFormat::Tar)
    } else if name.ends_with(".zip") {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

/// Unpacks an upstream archive into a directory.
pub trait Extractor {
    /// Extract `archive` into `dest` (created if missing).
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Default extractor: pure-Rust codecs, with bzip2 delegated to `tar`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeExtractor;

impl Extractor for NativeExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let format = detect_format(archive).ok_or_else(|| {
            let ext = archive
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            PortsError::msg(format!("unhandled extension: {}", ext))
        })?;
        debug!("extracting {} ({:?})", archive.display(), format);
        fs::create_dir_all(dest)?;

        match format {
            ArchiveFormat::TarGz => {
                let reader = BufReader::new(File::open(archive)?);
                unpack_tar(flate2::read::GzDecoder::new(reader), dest)
            }
            ArchiveFormat::TarXz => {
                let reader = BufReader::new(File::open(archive)?);
                unpack_tar(xz2::read::XzDecoder::new(reader), dest)
            }
            ArchiveFormat::Tar => unpack_tar(BufReader::new(File::open(archive)?), dest),
            ArchiveFormat::Zip => unpack_zip(archive, dest),
            ArchiveFormat::TarBz2 => system_tar(archive, dest),
        }
    }
}

/// Unpack a tar stream, rejecting entries that escape `dest`.
pub fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        if !entry.unpack_in(dest)? {
            return Err(FormatError::Invalid(format!(
                "Invalid path in archive: {}",
                entry_path.display()
            ))
            .into());
        }
    }
    Ok(())
}

fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| FormatError::Invalid(e.to_string()))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| FormatError::Invalid(e.to_string()))?;
        let Some(relative) = file.enclosed_name() else {
            return Err(FormatError::Invalid(format!(
                "Invalid path in archive: {}",
                file.name()
            ))
            .into());
        };
        let target = dest.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut file, &mut out)?;
        if let Some(mode) = file.unix_mode() {
            set_mode(&target, mode)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

fn system_tar(archive: &Path, dest: &Path) -> Result<()> {
    let status = Command::new("tar")
        .arg("xf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .status()
        .map_err(|_| BuildError::NotFound("tar".to_string()))?;
    if !status.success() {
        return Err(BuildError::CommandFailed {
            command: format!("tar xf {} -C {}", archive.display(), dest.display()),
            code: status.code(),
        }
        .into());
    }
    Ok(())
}
