use crate::config::Overlay;
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as layer};

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Logger {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Logger {
    pub fn new(format: LogFormat, level: LogLevel) -> Self {
        Self { format, level }
    }

    /// Install the global subscriber. `RUST_LOG` takes precedence over the
    /// configured level when set.
    pub fn init(&self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.level.to_string()))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        match self.format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer::layer().json().with_current_span(false))
                    .try_init()
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            }
            LogFormat::Text => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer::layer().with_target(false))
                    .try_init()
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggerArgs {
    /// Log output format
    #[arg(long, env = "VOLSHIFT_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Minimum level of emitted events
    #[arg(long, env = "VOLSHIFT_LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,
}

impl Overlay for LoggerArgs {
    fn overlay(self, over: Self) -> Self {
        Self {
            log_format: self.log_format.overlay(over.log_format),
            log_level: self.log_level.overlay(over.log_level),
        }
    }
}

impl From<LoggerArgs> for Logger {
    fn from(args: LoggerArgs) -> Self {
        Self {
            format: args.log_format.unwrap_or_default(),
            level: args.log_level.unwrap_or_default(),
        }
    }
}
