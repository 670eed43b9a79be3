//! Show install receipt command.

use super::report;
use std::process::ExitCode;
use webports_lib::{Configuration, Context, InstalledPackage, Result};

/// Print the install stamp of an installed package.
pub fn cmd_info(ctx: &Context, config: &Configuration, package: &str) -> ExitCode {
    match print_receipt(ctx, config, package) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

fn print_receipt(ctx: &Context, config: &Configuration, package: &str) -> Result<()> {
    let pkg = InstalledPackage::load(ctx.sdk(), package, config)?;
    let stamp = ctx.sdk().install_stamp(pkg.name(), config)?;
    println!("Install receipt: {}", stamp.display());
    print!("{}", std::fs::read_to_string(&stamp)?);
    Ok(())
}
