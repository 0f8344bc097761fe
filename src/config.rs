//! Layered configuration.
//!
//! Settings are read from an optional TOML file and then overlaid with
//! whatever was given on the command line or through the environment. The
//! merged, still partial, argument struct is converted into a fully resolved
//! config with `TryFrom`, which is where defaults are applied and values are
//! validated.
use clap::Args;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod engine;
pub mod serve;

pub use engine::{EngineArgs, EngineConfig, Timeout};
pub use serve::{RunConfig, RunSettings, ServeArgs, ServeConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Validation(String),
}

/// Trait for merging two partial structs.
pub trait Overlay {
    /// self is the base layer, over is the top layer.
    fn overlay(self, over: Self) -> Self;
}

// If top layer exists, use it. Otherwise keep base.
impl<T> Overlay for Option<T> {
    fn overlay(self, over: Self) -> Self {
        over.or(self)
    }
}

impl<T> Overlay for Vec<T> {
    fn overlay(self, over: Self) -> Self {
        if over.is_empty() { self } else { over }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LayeredArgs<T: Args> {
    /// Path to configuration file
    #[arg(long, env = "VOLSHIFT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub inner: T,
}

impl<T> LayeredArgs<T>
where
    T: Args,
{
    pub fn load<C>(self) -> Result<C, ConfigError>
    where
        T: Layered<C>,
    {
        self.inner.resolve(self.config.as_deref())
    }
}

pub trait Layered<C>: Overlay + DeserializeOwned + Default + Sized {
    fn resolve(self, config_path: Option<&Path>) -> Result<C, ConfigError>;
}

impl<T, C> Layered<C> for T
where
    T: Overlay + DeserializeOwned + Default,
    T: TryInto<C>,
    <T as TryInto<C>>::Error: Into<ConfigError>,
{
    fn resolve(self, config_path: Option<&Path>) -> Result<C, ConfigError> {
        let base = match config_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<Self>(&content)?
            }
            Some(path) => {
                tracing::debug!(path = %path.display(), "configuration file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        let merged = base.overlay(self);

        merged.try_into().map_err(Into::into)
    }
}
