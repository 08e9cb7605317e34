// Logging setup
// The library only emits `tracing` events; the binary installs the subscriber once

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Default filter; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
    /// Optional file receiving a copy of every event, without ANSI colors
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file: None,
        }
    }
}

/// Build the filter: `RUST_LOG` first, then the configured level
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: stderr plus an optional log file
pub fn init(settings: &LogSettings) -> Result<()> {
    let stderr_layer = match settings.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .flatten_event(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let file_layer = match &settings.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(env_filter(&settings.level))
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
