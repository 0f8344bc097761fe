//! Container runtime client abstraction.
//!
//! Defines the [`ContainerRuntime`] trait, the narrow set of engine calls the
//! orchestrator needs, so that the coordination logic stays independent of the
//! concrete engine API. The Docker Engine implementation lives in [`docker`].
use crate::types::{ContainerId, ImageRef, VolumeName};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[cfg(feature = "docker")]
pub mod docker;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The referenced container or image does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The registry rejected the supplied credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The engine answered with an error status
    #[error("engine returned {status}: {message}")]
    Api { status: u16, message: String },

    /// An error reported in the middle of a streamed response
    #[error("stream error: {0}")]
    Stream(String),

    /// Transport level failure talking to the engine
    #[error("connection error: {0}")]
    Connection(String),

    /// Credentials could not be decoded
    #[error("invalid registry credentials: {0}")]
    Credentials(String),
}

impl RuntimeError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RuntimeError::Unauthorized(_))
    }
}

/// A container as reported by the runtime's listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub names: Vec<String>,
    /// Lifecycle state as reported by the engine (`running`, `exited`, ...)
    pub state: String,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Everything required to create a worker container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateSpec {
    pub image: String,
    pub command: Vec<String>,
    /// Bind specifications in `source:target[:mode]` form
    pub binds: Vec<String>,
    pub labels: HashMap<String, String>,
    pub user: Option<String>,
}

/// A demultiplexed chunk of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

impl LogChunk {
    pub fn bytes(&self) -> &[u8] {
        match self {
            LogChunk::Stdout(b) | LogChunk::Stderr(b) => b,
        }
    }
}

/// Base64 encoded `X-Registry-Auth` payload supplied by the caller.
#[derive(Debug, Clone)]
pub struct RegistryAuth(pub SecretString);

impl RegistryAuth {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(SecretString::new(encoded.into().into()))
    }

    /// Decode the payload into registry credentials.
    ///
    /// Blank payloads (including the encoded newline some clients send when
    /// the user never logged in) mean "no credentials".
    pub fn decode(&self) -> Result<Option<RegistryCredentials>, RuntimeError> {
        let encoded = self.0.expose_secret().trim();
        if encoded.is_empty() {
            return Ok(None);
        }
        let raw = STANDARD
            .decode(encoded)
            .or_else(|_| URL_SAFE.decode(encoded))
            .map_err(|e| RuntimeError::Credentials(e.to_string()))?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| RuntimeError::Credentials(e.to_string()))
    }
}

/// Decoded `X-Registry-Auth` JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryCredentials {
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub auth: Option<SecretString>,
    pub email: Option<String>,
    pub serveraddress: Option<String>,
    pub identitytoken: Option<SecretString>,
    pub registrytoken: Option<SecretString>,
}

/// The engine operations the orchestrator relies on.
///
/// Every method is a suspension point; implementations must not hold locks
/// shared with other operations across calls.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers, in any state, whose mounts reference `volume`.
    async fn list_containers(
        &self,
        volume: &VolumeName,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Stop a container using the engine's default grace period.
    async fn stop_container(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    async fn start_container(&self, id: &ContainerId) -> Result<(), RuntimeError>;

    async fn create_container(&self, spec: &CreateSpec) -> Result<ContainerId, RuntimeError>;

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), RuntimeError>;

    /// Block until the container is no longer running and return its exit code.
    async fn wait_container(&self, id: &ContainerId) -> Result<i64, RuntimeError>;

    /// Fetch the complete stdout/stderr of a (stopped) container.
    async fn logs(&self, id: &ContainerId) -> Result<Vec<LogChunk>, RuntimeError>;

    async fn image_exists(&self, image: &ImageRef) -> Result<bool, RuntimeError>;

    /// Pull an image, consuming the progress stream until completion.
    async fn pull_image(
        &self,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), RuntimeError>;

    async fn push_image(
        &self,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), RuntimeError>;

    /// Commit a container's filesystem as a new image.
    async fn commit_container(
        &self,
        id: &ContainerId,
        image: &ImageRef,
        labels: &HashMap<String, String>,
    ) -> Result<(), RuntimeError>;
}
