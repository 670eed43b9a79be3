//! List packages command.

use super::report;
use serde::Serialize;
use std::process::ExitCode;
use webports_lib::{Configuration, Context, InstalledPackage, PortsError};

#[derive(Serialize)]
struct Entry {
    name: String,
    version: String,
}

/// List installed packages, or every known port with `all`.
pub fn cmd_list(
    ctx: &Context,
    config: &Configuration,
    all: bool,
    verbose: bool,
    json: bool,
) -> ExitCode {
    let entries: Vec<Entry> = if all {
        ctx.storage()
            .ports()
            .into_iter()
            .map(|p| Entry {
                name: p.name().to_string(),
                version: p.version().to_string(),
            })
            .collect()
    } else {
        match InstalledPackage::all(ctx.sdk(), config) {
            Ok(installed) => installed
                .iter()
                .map(|p| Entry {
                    name: p.name().to_string(),
                    version: p.version().to_string(),
                })
                .collect(),
            Err(e) => return report(&e),
        }
    };

    if json {
        match serde_json::to_string_pretty(&entries) {
            Ok(text) => println!("{}", text),
            Err(e) => return report(&PortsError::from(e)),
        }
        return ExitCode::SUCCESS;
    }

    for entry in entries {
        if verbose {
            println!("{:<15} {}", entry.name, entry.version);
        } else {
            println!("{}", entry.name);
        }
    }
    ExitCode::SUCCESS
}
