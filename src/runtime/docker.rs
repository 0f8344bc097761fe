use super::{ContainerRuntime, ContainerSummary, CreateSpec, LogChunk, RegistryAuth, RuntimeError};
use crate::types::{ContainerId, ImageRef, VolumeName};
use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{CommitContainerOptions, CreateImageOptions, PushImageOptions};
use bollard::models::HostConfig;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    client: Docker,
    platform: String,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the platform default socket.
    pub fn connect_local(platform: impl Into<String>) -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_local_defaults().map_err(map_error)?;
        Ok(Self {
            client,
            platform: platform.into(),
        })
    }

    /// Connect to an engine listening on a specific unix socket.
    pub fn connect_socket(
        socket: &Path,
        platform: impl Into<String>,
    ) -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_socket(
            &socket.to_string_lossy(),
            CONNECT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(map_error)?;
        Ok(Self {
            client,
            platform: platform.into(),
        })
    }

    /// Negotiate the API version with the engine.
    pub async fn negotiate(self) -> Result<Self, RuntimeError> {
        let client = self.client.negotiate_version().await.map_err(map_error)?;
        Ok(Self { client, ..self })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(
        &self,
        volume: &VolumeName,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let filters = HashMap::from([("volume".to_string(), vec![volume.to_string()])]);
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(map_error)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = ContainerId::new(c.id?).ok()?;
                Some(ContainerSummary {
                    id,
                    names: c.names.unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn stop_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.client
            .stop_container(id.as_str(), None::<StopContainerOptions>)
            .await
            .map_err(map_error)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.client
            .start_container::<String>(id.as_str(), None)
            .await
            .map_err(map_error)
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<ContainerId, RuntimeError> {
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            user: spec.user.clone(),
            labels: Some(spec.labels.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .client
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(map_error)?;

        for warning in &created.warnings {
            debug!(container = %created.id, "create warning: {}", warning);
        }
        ContainerId::new(created.id)
            .map_err(|e| RuntimeError::Stream(format!("engine returned {}", e)))
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.client
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(map_error)
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, RuntimeError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.client.wait_container(id.as_str(), Some(options));

        let mut exit_code = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(resp) => exit_code = Some(resp.status_code),
                // bollard surfaces a non-zero exit as an error carrying the code
                Err(BollardError::DockerContainerWaitError { code, .. }) => {
                    exit_code = Some(code)
                }
                Err(e) => return Err(map_error(e)),
            }
        }

        exit_code.ok_or_else(|| RuntimeError::Stream("wait stream ended without a status".into()))
    }

    async fn logs(&self, id: &ContainerId) -> Result<Vec<LogChunk>, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };
        let mut stream = self.client.logs(id.as_str(), Some(options));

        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            match item.map_err(map_error)? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    chunks.push(LogChunk::Stdout(message.to_vec()))
                }
                LogOutput::StdErr { message } => chunks.push(LogChunk::Stderr(message.to_vec())),
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok(chunks)
    }

    async fn image_exists(&self, image: &ImageRef) -> Result<bool, RuntimeError> {
        match self.client.inspect_image(image.as_str()).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(map_error(e)),
        }
    }

    async fn pull_image(
        &self,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), RuntimeError> {
        let credentials = docker_credentials(auth)?;
        let options = CreateImageOptions {
            from_image: image.as_str(),
            platform: self.platform.as_str(),
            ..Default::default()
        };

        info!(image = %image, "pulling image");
        let mut stream = self.client.create_image(Some(options), None, credentials);
        while let Some(item) = stream.next().await {
            let progress = item.map_err(map_error)?;
            if let Some(error) = progress.error {
                return Err(classify_message(error));
            }
            if let Some(status) = progress.status {
                debug!(image = %image, progress = progress.progress.as_deref().unwrap_or(""), "{}", status);
            }
        }
        Ok(())
    }

    async fn push_image(
        &self,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), RuntimeError> {
        let credentials = docker_credentials(auth)?;
        let options = PushImageOptions {
            tag: image.tag_or_latest(),
        };

        info!(image = %image, "pushing image");
        let mut stream = self
            .client
            .push_image(image.repository(), Some(options), credentials);
        while let Some(item) = stream.next().await {
            let progress = item.map_err(map_error)?;
            if let Some(error) = progress.error {
                return Err(classify_message(error));
            }
            if let Some(status) = progress.status {
                debug!(image = %image, "{}", status);
            }
        }
        Ok(())
    }

    async fn commit_container(
        &self,
        id: &ContainerId,
        image: &ImageRef,
        labels: &HashMap<String, String>,
    ) -> Result<(), RuntimeError> {
        let options = CommitContainerOptions {
            container: id.as_str(),
            repo: image.repository(),
            tag: image.tag_or_latest(),
            comment: "volume snapshot",
            pause: true,
            ..Default::default()
        };
        let config = Config {
            labels: Some(labels.clone()),
            ..Default::default()
        };

        self.client
            .commit_container(options, config)
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

/// Engine form of the caller's registry credentials.
fn docker_credentials(
    auth: Option<&RegistryAuth>,
) -> Result<Option<DockerCredentials>, RuntimeError> {
    let Some(creds) = auth.map(RegistryAuth::decode).transpose()?.flatten() else {
        return Ok(None);
    };
    let expose = |s: Option<SecretString>| s.map(|s| s.expose_secret().to_string());
    Ok(Some(DockerCredentials {
        username: creds.username,
        password: expose(creds.password),
        auth: expose(creds.auth),
        email: creds.email,
        serveraddress: creds.serveraddress,
        identitytoken: expose(creds.identitytoken),
        registrytoken: expose(creds.registrytoken),
    }))
}

fn classify_message(message: String) -> RuntimeError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("unauthorized")
        || lower.contains("authentication required")
        || lower.contains("denied")
    {
        RuntimeError::Unauthorized(message)
    } else {
        RuntimeError::Stream(message)
    }
}

fn map_error(e: BollardError) -> RuntimeError {
    match e {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => match status_code {
            401 | 403 => RuntimeError::Unauthorized(message),
            404 => RuntimeError::NotFound(message),
            _ => {
                // Registries relay auth failures through a 500 from the engine.
                match classify_message(message) {
                    RuntimeError::Unauthorized(m) => RuntimeError::Unauthorized(m),
                    RuntimeError::Stream(m) => RuntimeError::Api {
                        status: status_code,
                        message: m,
                    },
                    other => other,
                }
            }
        },
        BollardError::DockerStreamError { error } => classify_message(error),
        other => RuntimeError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_credentials() {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;

        assert!(docker_credentials(None).unwrap().is_none());
        assert!(docker_credentials(Some(&RegistryAuth::new("Cg=="))).unwrap().is_none());

        let json = r#"{"username":"alice","password":"hunter2","serveraddress":"ghcr.io"}"#;
        let auth = RegistryAuth::new(STANDARD.encode(json));
        let creds = docker_credentials(Some(&auth)).unwrap().unwrap();
        assert_eq!(creds.username.as_deref(), Some("alice"));
        assert_eq!(creds.password.as_deref(), Some("hunter2"));
        assert_eq!(creds.serveraddress.as_deref(), Some("ghcr.io"));
    }

    #[test]
    fn test_auth_failures_classified() {
        let e = map_error(BollardError::DockerResponseServerError {
            status_code: 500,
            message: "Head https://r/v2/x/manifests/latest: unauthorized: authentication required"
                .into(),
        });
        assert!(e.is_unauthorized());

        let e = map_error(BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such image".into(),
        });
        assert!(matches!(e, RuntimeError::NotFound(_)));

        let e = map_error(BollardError::DockerStreamError {
            error: "manifest unknown".into(),
        });
        assert!(matches!(e, RuntimeError::Stream(_)));
    }
}
