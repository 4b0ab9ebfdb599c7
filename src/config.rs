//! Service configuration.
//!
//! Settings are layered: `sketchforge.toml` → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//! public_dir = "public"
//! dev = false
//!
//! [arduino]
//! cli_path = "arduino-cli"
//! temp_dir = "/tmp/arduino-web-ide"
//! preferred_boards = ["Arduino Uno", "Arduino Mega"]
//! cleanup_delay_secs = 5
//! command_timeout_secs = 120
//! ```
//!
//! # Environment Variables
//!
//! - `PORT`: listening port
//! - `ARDUINO_CLI`: path to the `arduino-cli` binary
//! - `SKETCHFORGE_TEMP_DIR`: root directory for sketch workspaces

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sketchforge.toml";

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served at `/`
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Permissive CORS for a front-end dev server on another origin
    #[serde(default)]
    pub dev: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_dir: default_public_dir(),
            dev: false,
        }
    }
}

/// How `arduino-cli` is invoked and how its workspaces are managed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArduinoSection {
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    /// Workspace root; defaults to `<os temp>/arduino-web-ide`
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Board names preferred during port selection, most preferred first
    #[serde(default = "default_preferred_boards")]
    pub preferred_boards: Vec<String>,
    #[serde(default = "default_cleanup_delay_secs")]
    pub cleanup_delay_secs: u64,
    /// Unbounded when absent
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl Default for ArduinoSection {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            temp_dir: None,
            preferred_boards: default_preferred_boards(),
            cleanup_delay_secs: default_cleanup_delay_secs(),
            command_timeout_secs: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_cli_path() -> String {
    "arduino-cli".to_string()
}

fn default_preferred_boards() -> Vec<String> {
    vec!["Arduino Uno".to_string()]
}

fn default_cleanup_delay_secs() -> u64 {
    5
}

/// The complete sketchforge.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub arduino: ArduinoSection,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse sketchforge.toml")
    }

    /// Load `sketchforge.toml` from `dir`, or defaults if it doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` in place of the process environment.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", port))?;
        }
        if let Some(cli) = lookup("ARDUINO_CLI") {
            self.arduino.cli_path = cli;
        }
        if let Some(dir) = lookup("SKETCHFORGE_TEMP_DIR") {
            self.arduino.temp_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Root directory under which per-request workspaces are created.
    pub fn temp_root(&self) -> PathBuf {
        self.arduino
            .temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("arduino-web-ide"))
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.arduino.cleanup_delay_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.arduino.command_timeout_secs.map(Duration::from_secs)
    }

    /// Address string for the listener, e.g. `0.0.0.0:3000`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Check the configuration and return human-readable warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.server.public_dir.is_dir() {
            warnings.push(format!(
                "Public directory '{}' does not exist; static files will not be served",
                self.server.public_dir.display()
            ));
        }
        if self.arduino.cli_path.trim().is_empty() {
            warnings.push("arduino.cli_path is empty".to_string());
        }
        if self
            .arduino
            .preferred_boards
            .iter()
            .any(|b| b.trim().is_empty())
        {
            warnings.push("arduino.preferred_boards contains an empty name".to_string());
        }
        if self.arduino.command_timeout_secs == Some(0) {
            warnings.push("arduino.command_timeout_secs = 0 fails every build".to_string());
        }

        warnings
    }
}
