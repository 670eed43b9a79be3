//! Command implementations for the webports CLI.

mod clean;
mod index;
mod info;
mod list;
mod package;

pub use index::cmd_index;
pub use info::cmd_info;
pub use list::cmd_list;
pub use package::{cmd_package, PkgAction, PkgOptions};

use colored::Colorize;
use std::process::ExitCode;
use webports_lib::PortsError;

/// Print `webports: <msg>` in red on stderr and map to a failure exit code.
///
/// With `WEBPORTS_DEBUG` set the full error structure is printed instead.
pub fn report(err: &PortsError) -> ExitCode {
    log::debug!("command failed: {:?}", err);
    if std::env::var_os("WEBPORTS_DEBUG").is_some() {
        eprintln!("webports: {:#?}", err);
    } else {
        eprintln!("webports: {}", err.to_string().red());
    }
    ExitCode::FAILURE
}
