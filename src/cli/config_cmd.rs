//! `config` command handler.

use anyhow::Result;

use voucherd::config::Config;

/// Print the effective configuration after file and environment layering.
pub(crate) fn cmd_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
