use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::logging::{LogFormat, LogSettings};
use crate::store::{ConfigStore, NSP_SECTION};

/// NSP Token Manager - issues, caches and refreshes NSP bearer tokens
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the INI configuration file
    #[arg(short, long, env = "NSP_CONFIG", default_value = "nsp_config.ini", global = true)]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "compact", global = true)]
    pub log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, env = "NSP_LOG_FILE", global = true)]
    pub log_file: Option<String>,

    /// Seconds to wait for another process refreshing the same config
    #[arg(long, env = "NSP_LOCK_TIMEOUT", default_value = "90", global = true)]
    pub lock_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print a valid token, refreshing it if necessary
    Token {
        /// Print the full access token instead of a prefix
        #[arg(long)]
        raw: bool,
    },

    /// Scheduled refresh; does nothing outside the configured working hours
    Refresh {
        /// Refresh even outside the active window
        #[arg(long)]
        force: bool,
    },

    /// Check the current token against the NSP API
    Verify,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub config_path: PathBuf,
    pub lock_timeout: Duration,
    pub log: LogSettings,
    pub command: Command,
}

impl Settings {
    /// Load settings with priority: CLI > ENV (including .env) > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let settings = Settings {
            config_path: expand_tilde(&args.config),
            lock_timeout: Duration::from_secs(args.lock_timeout),
            log: LogSettings {
                level: args.log_level.to_lowercase(),
                format: args.log_format,
                file: args.log_file.map(|s| expand_tilde(&s)),
            },
            command: args.command,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout.is_zero() {
            anyhow::bail!("--lock-timeout must be greater than zero");
        }
        if self.config_path.as_os_str().is_empty() {
            anyhow::bail!("--config must not be empty");
        }
        Ok(())
    }

    /// Load the store named by these settings
    pub fn load_store(&self) -> Result<ConfigStore> {
        ConfigStore::load(&self.config_path)
            .with_context(|| format!("Failed to load {}", self.config_path.display()))
    }
}

/// `verify_ssl` from the [NSP] section; relaxed (false) when absent
pub fn verify_ssl(store: &ConfigStore) -> Result<bool, ConfigError> {
    match store.get_opt(NSP_SECTION, "verify_ssl").map(str::trim) {
        None | Some("") => Ok(false),
        Some(value) => parse_bool(value).ok_or_else(|| ConfigError::Invalid {
            key: "verify_ssl".to_string(),
            reason: format!("'{}' is not a boolean", value),
        }),
    }
}

/// Parse INI-style booleans
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Expand tilde (~) in file paths to user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
