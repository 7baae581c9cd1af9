pub mod build;
pub mod check;
pub mod connect;
pub mod daemon;
pub mod verify;

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::client::InventoryClient;
use crate::config::{self, Config};
use crate::domain::types::Report;
use crate::registry::restconf::RestconfRegistry;

/// Load configuration and construct the two live backends every
/// reconciliation command needs.
pub(crate) fn connections(
    config_path: Option<&str>,
) -> Result<(Config, InventoryClient, RestconfRegistry)> {
    let config = config::load(config_path.map(Path::new))?;
    let client = InventoryClient::new(&config.inventory)?;
    let registry = RestconfRegistry::new(&config.registry)?;
    Ok((config, client, registry))
}

/// Print a report the way the original CLI surfaces action output, then
/// exit non-zero if the operation did not succeed.
pub(crate) fn finish(report: Report) -> Result<()> {
    for line in &report.messages {
        println!("{line}");
    }
    if report.success {
        println!("{}", "success".green());
        Ok(())
    } else {
        println!("{}", "failed".red());
        std::process::exit(1);
    }
}
