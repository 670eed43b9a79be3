//! Shared file helpers: hashing, stamps, binary detection, tree removal.

use crate::error::{HashVerificationError, PortsError, Result};
use log::{debug, trace};
use sha1::{Digest, Sha1};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

const HASH_BLOCK_SIZE: usize = 100 * 1024;

/// SHA1 of a file's contents, lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| PortsError::msg(format!("unable to read {}: {}", path.display(), e)))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fail with [`HashVerificationError`] unless `path` hashes to `expected`.
pub fn verify_hash(path: &Path, expected: &str) -> Result<()> {
    let actual = hash_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(HashVerificationError {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        }
        .into());
    }
    trace!("verified {} ({})", path.display(), actual);
    Ok(())
}

/// Write a stamp file, creating parent directories.
pub fn write_stamp(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// True if the stamp exists and, when `expected` is given, holds exactly
/// that content.
pub fn check_stamp(path: &Path, expected: Option<&str>) -> bool {
    if !path.exists() {
        return false;
    }
    match expected {
        None => true,
        Some(expected) => fs::read_to_string(path)
            .map(|content| content == expected)
            .unwrap_or(false),
    }
}

/// Read the first four bytes of a file.
fn magic(path: &Path) -> Option<[u8; 4]> {
    let mut file = File::open(path).ok()?;
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf).ok()?;
    Some(buf)
}

/// True for ELF binaries.
pub fn is_elf_file(path: &Path) -> bool {
    path.is_file() && !path.is_symlink() && magic(path) == Some(*b"\x7fELF")
}

/// True for portable executables (pexe bitcode).
pub fn is_pexe_file(path: &Path) -> bool {
    path.is_file() && !path.is_symlink() && magic(path) == Some(*b"PEXE")
}

/// Remove a directory tree if it exists.
pub fn remove_tree(path: &Path) -> Result<()> {
    if !path.exists() && !path.is_symlink() {
        return Ok(());
    }
    if !path.is_dir() {
        return Err(PortsError::msg(format!(
            "remove_tree: not a directory: {}",
            path.display()
        )));
    }
    debug!("removing {}", path.display());
    fs::remove_dir_all(path)?;
    Ok(())
}

/// Remove a file if it exists.
pub fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Replace every occurrence of `from` with `to` in a text file.
///
/// Files that are not valid UTF-8 are left untouched.
pub fn relocate_file(path: &Path, from: &str, to: &str) -> Result<bool> {
    let Ok(content) = fs::read_to_string(path) else {
        return Ok(false);
    };
    if !content.contains(from) {
        return Ok(false);
    }
    fs::write(path, content.replace(from, to))?;
    Ok(true)
}

/// Clear the executable bits of a file.
#[cfg(unix)]
pub fn clear_exec_bits(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() & !0o111);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn clear_exec_bits(_path: &Path) -> Result<()> {
    Ok(())
}

/// Shell-style glob match supporting `*` and `?`. Case-sensitive.
pub fn matches_glob(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }

    p == pattern.len()
}

/// Compact duration: `1m5s`, `42s`.
pub fn format_time_delta(delta: Duration) -> String {
    let total = delta.as_secs_f64().round() as u64;
    let mins = total / 60;
    let secs = total % 60;
    let mut out = String::new();
    if mins > 0 {
        out.push_str(&format!("{}m", mins));
    }
    if secs > 0 || mins == 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}
