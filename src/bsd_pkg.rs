//! FreeBSD `pkg` archives for publishing.
//!
//! Just enough of the format for `pkg` to install the result: an
//! xz-compressed tar holding `+COMPACT_MANIFEST` and `+MANIFEST` (UCL
//! documents) followed by the payload under the absolute prefix `/usr`.
//! `+MANIFEST` adds a `files` map of SHA-256 content hashes.
//!
//! Symlinks are replaced by a copy of their target (directory targets are
//! skipped), and `.nexe` / `.pexe` extensions are dropped from file names.

use crate::binary_package::INSTALL_PREFIX as BUILD_PREFIX;
use crate::error::{PortsError, Result};
use crate::storage::Storage;
use jwalk::WalkDir;
use log::info;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use xz2::write::XzEncoder;

/// Install prefix inside the archive.
pub const INSTALL_PREFIX: &str = "usr";

/// Build-time only dependencies, never recorded in `deps`.
pub const BUILD_ONLY_DEPS: &[&str] = &["glibc-compat", "libtar", "python-host", "gmp", "mpfr", "mpc"];

const MAINTAINER: &str = "native-client-discuss@googlegroups.com";
const WWW: &str = "https://code.google.com/p/naclports/";

/// Manifest value kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Ucl {
    Str(String),
    /// path -> sha256
    Files(Vec<(String, String)>),
    /// name -> {origin, version}
    Deps(Vec<(String, String)>),
}

type Manifest = Vec<(&'static str, Ucl)>;

/// Serialize a manifest in the UCL subset `pkg` reads.
fn write_ucl(manifest: &Manifest) -> String {
    let mut out = String::from("{\n");
    for (key, value) in manifest {
        match value {
            Ucl::Str(s) => out.push_str(&format!("  \"{}\": \"{}\",\n", key, s)),
            Ucl::Files(files) => {
                out.push_str(&format!("  \"{}\": \n  {{\n", key));
                for (name, hash) in files {
                    out.push_str(&format!("    \"{}\": \"{}\",\n", name, hash));
                }
                out.push_str("  }\n");
            }
            Ucl::Deps(deps) => {
                out.push_str(&format!("  \"{}\": \n  {{\n", key));
                for (name, version) in deps {
                    out.push_str(&format!("    \"{}\": \n    {{\n", name));
                    out.push_str(&format!("        \"origin\": \"{}\",\n", name));
                    out.push_str(&format!("        \"version\": \"{}\",\n", version));
                    out.push_str("    },\n");
                }
                out.push_str("  }\n");
            }
        }
    }
    out.push_str("}\n");
    out
}

fn strip_binary_ext(name: &str) -> &str {
    name.strip_suffix(".nexe")
        .or_else(|| name.strip_suffix(".pexe"))
        .unwrap_or(name)
}

/// Payload entries sorted by path, directories excluded.
fn payload_entries(payload_dir: &Path) -> Vec<(PathBuf, String, bool)> {
    let mut entries: Vec<(PathBuf, String, bool)> = WalkDir::new(payload_dir)
        .skip_hidden(false)
        .sort(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .filter_map(|e| {
            let path = e.path();
            let rel = path.strip_prefix(payload_dir).ok()?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            Some((path.clone(), rel, e.file_type().is_symlink()))
        })
        .collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1));
    entries
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Target of a payload symlink; absolute targets under the build prefix are
/// mapped into the payload.
fn resolve_link(link: &Path, payload_dir: &Path) -> Result<PathBuf> {
    let target = fs::read_link(link)?;
    let target = if target.is_absolute() {
        match target.strip_prefix(BUILD_PREFIX) {
            Ok(rest) => payload_dir.join(rest),
            Err(_) => target,
        }
    } else {
        link.parent().unwrap_or(payload_dir).join(target)
    };
    if !target.exists() {
        return Err(PortsError::msg(format!(
            "Package contains dangling link: {}",
            link.display()
        )));
    }
    Ok(target)
}

/// Append an entry whose name is absolute, which `tar::Header::set_path`
/// refuses. Long names get a GNU long-name record first.
fn append_absolute<W: Write, R: Read>(
    builder: &mut tar::Builder<W>,
    header: &mut tar::Header,
    name: &str,
    data: R,
) -> io::Result<()> {
    let bytes = name.as_bytes();
    let field_len = header.as_old().name.len();
    if bytes.len() > field_len {
        let mut long = tar::Header::new_gnu();
        long.set_path("././@LongLink")?;
        long.set_entry_type(tar::EntryType::GNULongName);
        long.set_mode(0o644);
        long.set_size(bytes.len() as u64 + 1);
        long.set_cksum();
        builder.append(&long, bytes.chain(&[0u8][..]))?;
    }
    let n = bytes.len().min(field_len);
    let field = &mut header.as_old_mut().name;
    field.fill(0);
    field[..n].copy_from_slice(&bytes[..n]);
    header.set_cksum();
    builder.append(header, data)
}

fn append_text<W: Write>(builder: &mut tar::Builder<W>, name: &str, text: &str) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(text.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, text.as_bytes())
}

/// Write `outfile` in FreeBSD pkg format from the staged `payload_dir`.
///
/// `depends` names are resolved through `storage` for their versions;
/// build-only dependencies are left out.
pub fn create_pkg_file(
    name: &str,
    version: &str,
    arch: &str,
    payload_dir: &Path,
    outfile: &Path,
    depends: &[String],
    storage: &Storage,
) -> Result<()> {
    info!("Creating pkg package: {}", outfile.display());

    let mut manifest: Manifest = vec![
        ("name", Ucl::Str(name.to_string())),
        ("version", Ucl::Str(version.to_string())),
        ("arch", Ucl::Str(format!("nacl:0:{}", arch))),
        ("origin", Ucl::Str(name.to_string())),
        ("comment", Ucl::Str("comment not available".to_string())),
        ("desc", Ucl::Str("desc not available".to_string())),
        ("maintainer", Ucl::Str(MAINTAINER.to_string())),
        ("www", Ucl::Str(WWW.to_string())),
        ("prefix", Ucl::Str(INSTALL_PREFIX.to_string())),
    ];

    if !depends.is_empty() {
        let mut deps = Vec::new();
        for dep in depends.iter().filter(|d| !BUILD_ONLY_DEPS.contains(&d.as_str())) {
            let port = storage.find(dep)?;
            deps.push((dep.clone(), port.version().to_string()));
        }
        manifest.push(("deps", Ucl::Deps(deps)));
    }

    let entries = payload_entries(payload_dir);
    let compact = write_ucl(&manifest);

    let mut files = Vec::new();
    for (path, rel, is_link) in &entries {
        if *is_link {
            continue;
        }
        let hashed_name = format!("/{}/{}", INSTALL_PREFIX, strip_binary_ext(rel));
        files.push((hashed_name, sha256_file(path)?));
    }
    manifest.push(("files", Ucl::Files(files)));
    let full = write_ucl(&manifest);

    if let Some(parent) = outfile.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = outfile.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let mut builder = tar::Builder::new(XzEncoder::new(file, 6));
        append_text(&mut builder, "+COMPACT_MANIFEST", &compact)?;
        append_text(&mut builder, "+MANIFEST", &full)?;

        for (path, rel, is_link) in &entries {
            let source = if *is_link {
                let target = resolve_link(path, payload_dir)?;
                if target.is_dir() {
                    continue;
                }
                target
            } else {
                path.clone()
            };
            let metadata = fs::metadata(&source)?;
            let mut header = tar::Header::new_gnu();
            header.set_metadata(&metadata);
            header.set_entry_type(tar::EntryType::Regular);
            let arcname = format!("/{}/{}", INSTALL_PREFIX, strip_binary_ext(rel));
            append_absolute(&mut builder, &mut header, &arcname, File::open(&source)?)?;
        }
        builder.into_inner()?.finish()?;
    }
    fs::rename(&tmp, outfile)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Port;
    use tempfile::TempDir;
    use xz2::read::XzDecoder;

    fn storage_with(dir: &Path, ports: &[(&str, &str)]) -> Storage {
        let mut storage = Storage::default();
        for (name, version) in ports {
            let root = dir.join("ports").join(name);
            fs::create_dir_all(&root).unwrap();
            fs::write(
                root.join("pkg_info"),
                format!("NAME={}\nVERSION={}\n", name, version),
            )
            .unwrap();
            storage.add(Port::load(&root).unwrap());
        }
        storage
    }

    fn read_pkg(path: &Path) -> Vec<(String, String)> {
        let mut archive = tar::Archive::new(XzDecoder::new(File::open(path).unwrap()));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = String::from_utf8_lossy(&e.path_bytes()).into_owned();
                let mut body = String::new();
                e.read_to_string(&mut body).unwrap();
                (name, body)
            })
            .collect()
    }

    #[test]
    fn ucl_layout() {
        let manifest: Manifest = vec![
            ("name", Ucl::Str("zlib".into())),
            ("deps", Ucl::Deps(vec![("png".into(), "1.6".into())])),
            ("files", Ucl::Files(vec![("/usr/lib/libz.a".into(), "ab".into())])),
        ];
        assert_eq!(
            write_ucl(&manifest),
            "{\n  \"name\": \"zlib\",\n  \"deps\": \n  {\n    \"png\": \n    {\n        \
             \"origin\": \"png\",\n        \"version\": \"1.6\",\n    },\n  }\n  \
             \"files\": \n  {\n    \"/usr/lib/libz.a\": \"ab\",\n  }\n}\n"
        );
    }

    #[test]
    fn creates_archive() {
        let dir = TempDir::new().unwrap();
        let storage = storage_with(dir.path(), &[("zlib", "1.2.8")]);
        let payload = dir.path().join("payload");
        fs::create_dir_all(payload.join("bin")).unwrap();
        fs::write(payload.join("bin/curl.nexe"), "nexe").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("curl.nexe", payload.join("bin/curl-link")).unwrap();

        let out = dir.path().join("publish/pkg_pnacl/curl-7.0.txz");
        let depends = vec!["zlib".to_string(), "gmp".to_string()];
        create_pkg_file("curl", "7.0", "pnacl", &payload, &out, &depends, &storage).unwrap();

        let entries = read_pkg(&out);
        assert_eq!(entries[0].0, "+COMPACT_MANIFEST");
        assert_eq!(entries[1].0, "+MANIFEST");
        assert!(entries[0].1.contains("\"arch\": \"nacl:0:pnacl\""));
        assert!(entries[0].1.contains("\"zlib\": "));
        assert!(!entries[0].1.contains("gmp"));
        assert!(!entries[0].1.contains("\"files\""));
        assert!(entries[1].1.contains("\"/usr/bin/curl\": "));
        assert!(entries.iter().any(|(n, b)| n == "/usr/bin/curl" && b == "nexe"));
        #[cfg(unix)]
        assert!(entries.iter().any(|(n, b)| n == "/usr/bin/curl-link" && b == "nexe"));
    }

    #[test]
    fn unknown_dependency() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::default();
        let payload = dir.path().join("payload");
        fs::create_dir_all(&payload).unwrap();
        let err = create_pkg_file(
            "curl",
            "7.0",
            "pnacl",
            &payload,
            &dir.path().join("out.txz"),
            &["zlib".to_string()],
            &storage,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Package not found: zlib");
    }
}
