use super::{ConfigError, Overlay};
use crate::orchestrator::{DEFAULT_HELPER_IMAGE, OrchestratorConfig};
use crate::types::ImageRef;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on how long a worker container may run.
///
/// Accepts human readable strings like "90s" or "15m".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeout(pub Duration);

impl FromStr for Timeout {
    type Err = humantime::DurationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        humantime::parse_duration(s.trim()).map(Timeout)
    }
}

impl TryFrom<String> for Timeout {
    type Error = humantime::DurationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Timeout> for String {
    fn from(t: Timeout) -> Self {
        t.to_string()
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

/// How to reach the container engine and what to run on it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Unix socket of the engine. `None` uses `DOCKER_HOST` or the local default.
    pub docker_host: Option<PathBuf>,
    pub platform: String,
    pub worker_image: ImageRef,
    pub helper_images: Vec<ImageRef>,
    pub exclusive: bool,
    pub worker_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            worker_image: self.worker_image.clone(),
            helper_images: self.helper_images.clone(),
            exclusive: self.exclusive,
            worker_timeout: self.worker_timeout,
        }
    }
}

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineArgs {
    /// Path to the container engine socket.
    ///
    /// When unset, `DOCKER_HOST` or the platform default socket is used.
    #[arg(long, env = "VOLSHIFT_DOCKER_HOST")]
    pub docker_host: Option<PathBuf>,

    /// Platform requested when pulling images, e.g. `linux/amd64`.
    ///
    /// **Default:** `linux/<host architecture>`
    #[arg(long, env = "VOLSHIFT_PLATFORM")]
    pub platform: Option<String>,

    /// Image used to run worker containers.
    ///
    /// **Default:** `docker.io/library/busybox:latest`
    #[arg(long, env = "VOLSHIFT_WORKER_IMAGE")]
    pub worker_image: Option<ImageRef>,

    /// Images pulled ahead of time at startup.
    ///
    /// **Default:** the worker image
    #[arg(long = "helper-image", env = "VOLSHIFT_HELPER_IMAGES", value_delimiter = ',')]
    pub helper_images: Vec<ImageRef>,

    /// Reject a second operation on a volume while one is running.
    ///
    /// **Default:** `true`
    #[arg(long, env = "VOLSHIFT_EXCLUSIVE")]
    pub exclusive: Option<bool>,

    /// Abort a worker container that runs longer than this.
    ///
    /// Unset means workers run for as long as their command takes.
    #[arg(long, env = "VOLSHIFT_WORKER_TIMEOUT")]
    pub worker_timeout: Option<Timeout>,
}

impl Overlay for EngineArgs {
    fn overlay(self, over: Self) -> Self {
        Self {
            docker_host: self.docker_host.overlay(over.docker_host),
            platform: self.platform.overlay(over.platform),
            worker_image: self.worker_image.overlay(over.worker_image),
            helper_images: self.helper_images.overlay(over.helper_images),
            exclusive: self.exclusive.overlay(over.exclusive),
            worker_timeout: self.worker_timeout.overlay(over.worker_timeout),
        }
    }
}

impl TryFrom<EngineArgs> for EngineConfig {
    type Error = ConfigError;

    fn try_from(args: EngineArgs) -> Result<Self, Self::Error> {
        if let Some(host) = &args.docker_host {
            if !host.is_absolute() {
                return Err(ConfigError::Validation(format!(
                    "docker host socket must be an absolute path: '{}'",
                    host.display()
                )));
            }
        }

        let worker_image = match args.worker_image {
            Some(image) => image,
            None => ImageRef::new(DEFAULT_HELPER_IMAGE)
                .map_err(|e| ConfigError::Validation(e.to_string()))?,
        };
        let helper_images = if args.helper_images.is_empty() {
            vec![worker_image.clone()]
        } else {
            args.helper_images
        };

        if matches!(args.worker_timeout, Some(Timeout(d)) if d.is_zero()) {
            return Err(ConfigError::Validation(
                "worker timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            docker_host: args.docker_host,
            platform: args.platform.unwrap_or_else(default_platform),
            worker_image,
            helper_images,
            exclusive: args.exclusive.unwrap_or(true),
            worker_timeout: args.worker_timeout.map(|t| t.0),
        })
    }
}

/// `linux/<arch>` using the engine's architecture names.
pub fn default_platform() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "arm",
        "x86" => "386",
        other => other,
    };
    format!("linux/{arch}")
}
