use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sketchforge::config::ServiceConfig;
use sketchforge::logging::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "sketchforge")]
#[command(version, about = "Compile and upload Arduino sketches over HTTP")]
pub struct Cli {
    /// Path to a sketchforge.toml. Defaults to ./sketchforge.toml when present.
    #[arg(long, global = true, env = "SKETCHFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value = "compact")]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings that override the config file and environment.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Port to listen on
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Directory of static files served at /
    #[arg(long, global = true)]
    pub public_dir: Option<PathBuf>,

    /// Path to the arduino-cli binary
    #[arg(long, global = true)]
    pub arduino_cli: Option<String>,

    /// Root directory for per-request sketch workspaces
    #[arg(long, global = true)]
    pub temp_dir: Option<PathBuf>,

    /// Board name preferred when picking an upload port (repeatable, most preferred first)
    #[arg(long = "preferred-board", global = true)]
    pub preferred_boards: Vec<String>,

    /// Seconds to wait before deleting a finished workspace
    #[arg(long, global = true)]
    pub cleanup_delay: Option<u64>,

    /// Kill arduino-cli invocations running longer than this many seconds
    #[arg(long, global = true)]
    pub command_timeout: Option<u64>,

    /// Enable dev mode (CORS permissive for a separate front-end dev server)
    #[arg(long, global = true)]
    pub dev: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(dir) = &self.public_dir {
            config.server.public_dir = dir.clone();
        }
        if let Some(cli) = &self.arduino_cli {
            config.arduino.cli_path = cli.clone();
        }
        if let Some(dir) = &self.temp_dir {
            config.arduino.temp_dir = Some(dir.clone());
        }
        if !self.preferred_boards.is_empty() {
            config.arduino.preferred_boards = self.preferred_boards.clone();
        }
        if let Some(secs) = self.cleanup_delay {
            config.arduino.cleanup_delay_secs = secs;
        }
        if let Some(secs) = self.command_timeout {
            config.arduino.command_timeout_secs = Some(secs);
        }
        if self.dev {
            config.server.dev = true;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Open the browser after the server starts
        #[arg(long)]
        open: bool,
    },
    /// Run `arduino-cli board list` and show which port an upload would use
    Detect,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = cmd::load_config(&cli)?;

    match &cli.command {
        Commands::Serve { open } => cmd::cmd_serve(config, *open).await?,
        Commands::Detect => cmd::cmd_detect(&config).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
