//! Configuration view and validation commands (`sketchforge config`).

use anyhow::{Context, Result};

use super::super::{Cli, ConfigCommands};
use sketchforge::config::ServiceConfig;

/// Resolve the effective configuration: file → environment → CLI flags.
pub fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            ServiceConfig::load_or_default(&cwd)?
        }
    };
    config.apply_env()?;
    cli.overrides.apply(&mut config);
    Ok(config)
}

pub fn cmd_config(config: &ServiceConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Sketchforge Configuration");
            println!("=========================");
            println!();
            let rendered =
                toml::to_string_pretty(config).context("Failed to serialize configuration")?;
            println!("{}", rendered);
            println!("Effective values:");
            println!("  workspace root = \"{}\"", config.temp_root().display());
            println!("  listen address = \"{}\"", config.bind_addr());
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }
    Ok(())
}
