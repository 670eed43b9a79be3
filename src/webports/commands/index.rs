//! Write a prebuilt package index.

use super::report;
use log::info;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use webports_lib::package_index::write_index;

/// Index `archives`, each served from `<url_base>/<file name>`.
pub fn cmd_index(output: &Path, url_base: &str, archives: &[PathBuf]) -> ExitCode {
    let base = url_base.trim_end_matches('/');
    let mut binaries = Vec::with_capacity(archives.len());
    for archive in archives {
        let Some(file_name) = archive.file_name() else {
            eprintln!("Invalid package path: {}", archive.display());
            return ExitCode::FAILURE;
        };
        let url = format!("{}/{}", base, file_name.to_string_lossy());
        binaries.push((archive.clone(), url));
    }

    match write_index(output, &binaries) {
        Ok(index) => {
            info!("wrote {} entries to {}", index.len(), output.display());
            println!("Wrote {} ({} packages)", output.display(), index.len());
            ExitCode::SUCCESS
        }
        Err(e) => report(&e),
    }
}
