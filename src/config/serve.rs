use super::{ConfigError, EngineArgs, EngineConfig, Overlay};
use crate::logging::{Logger, LoggerArgs};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SOCKET: &str = "/run/guest/ext.sock";

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub socket: PathBuf,
    pub engine: EngineConfig,
    pub logger: Logger,
}

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServeArgs {
    /// Path to the listening socket.
    ///
    /// **Default:** `/run/guest/ext.sock`
    #[arg(long, env = "VOLSHIFT_SOCKET")]
    pub socket: Option<PathBuf>,

    #[command(flatten)]
    #[serde(flatten)]
    pub engine: EngineArgs,

    /// Logging configuration
    #[command(flatten)]
    #[serde(flatten)]
    pub logger: LoggerArgs,
}

impl Overlay for ServeArgs {
    fn overlay(self, over: Self) -> Self {
        Self {
            socket: self.socket.overlay(over.socket),
            engine: self.engine.overlay(over.engine),
            logger: self.logger.overlay(over.logger),
        }
    }
}

impl TryFrom<ServeArgs> for ServeConfig {
    type Error = ConfigError;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let socket = args
            .socket
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET));
        if !socket.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "socket must be an absolute path: '{}'",
                socket.display()
            )));
        }
        Ok(Self {
            socket,
            engine: args.engine.try_into()?,
            logger: args.logger.into(),
        })
    }
}

/// Settings for a one-shot operation: everything except the listener.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub engine: EngineConfig,
    pub logger: Logger,
}

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RunSettings {
    #[command(flatten)]
    #[serde(flatten)]
    pub engine: EngineArgs,

    /// Logging configuration
    #[command(flatten)]
    #[serde(flatten)]
    pub logger: LoggerArgs,
}

impl Overlay for RunSettings {
    fn overlay(self, over: Self) -> Self {
        Self {
            engine: self.engine.overlay(over.engine),
            logger: self.logger.overlay(over.logger),
        }
    }
}

impl TryFrom<RunSettings> for RunConfig {
    type Error = ConfigError;

    fn try_from(args: RunSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            engine: args.engine.try_into()?,
            logger: args.logger.into(),
        })
    }
}
