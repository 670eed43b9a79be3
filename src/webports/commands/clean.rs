//! `clean --all`: remove every build product of a configuration.

use log::info;
use std::path::Path;
use webports_lib::util::remove_tree;
use webports_lib::{Configuration, Context, Result};

/// Remove stamps, build trees, published and built packages, and the
/// install root (with its stamps) of `config`.
pub fn clean_all(ctx: &Context, config: &Configuration) -> Result<()> {
    let layout = ctx.layout();
    let sdk = ctx.sdk();
    for dir in [
        layout.stamp_root(),
        layout.build_root(),
        layout.publish_root(),
        layout.packages_root(),
        sdk.install_stamp_root(config)?,
        sdk.install_root(config)?,
    ] {
        remove(&dir)?;
    }
    Ok(())
}

fn remove(path: &Path) -> Result<()> {
    info!("removing {}", path.display());
    remove_tree(path)
}
