//! Runs one ephemeral helper container to completion.
//!
//! Every data operation boils down to "run a small POSIX utility in a container
//! that sees the source and destination as mounted paths". [`WorkerExecutor`]
//! owns that cycle: ensure image → create → start → wait → collect output →
//! (optionally) commit → remove. Cleanup runs regardless of the exit status.
use crate::operation::OperationError;
use crate::runtime::{ContainerRuntime, CreateSpec, LogChunk};
use crate::types::{ContainerId, ImageRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Description of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub image: ImageRef,
    pub command: Vec<String>,
    pub binds: Vec<String>,
    pub labels: HashMap<String, String>,
    pub user: Option<String>,
    /// Commit the container filesystem under this reference after a clean exit
    pub commit: Option<ImageRef>,
}

impl WorkerSpec {
    pub fn new(image: ImageRef, command: Vec<String>) -> Self {
        Self {
            image,
            command,
            binds: Vec::new(),
            labels: HashMap::new(),
            user: None,
            commit: None,
        }
    }

    /// Wrap a shell snippet as `/bin/sh -c <script>`.
    pub fn shell(image: ImageRef, script: impl Into<String>) -> Self {
        Self::new(
            image,
            vec!["/bin/sh".to_string(), "-c".to_string(), script.into()],
        )
    }

    pub fn bind(mut self, source: impl AsRef<str>, target: &str) -> Self {
        self.binds.push(format!("{}:{}", source.as_ref(), target));
        self
    }

    pub fn bind_ro(mut self, source: impl AsRef<str>, target: &str) -> Self {
        self.binds.push(format!("{}:{}:ro", source.as_ref(), target));
        self
    }

    pub fn labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn commit_as(mut self, image: ImageRef) -> Self {
        self.commit = Some(image);
        self
    }

    fn create_spec(&self) -> CreateSpec {
        CreateSpec {
            image: self.image.to_string(),
            command: self.command.clone(),
            binds: self.binds.clone(),
            labels: self.labels.clone(),
            user: self.user.clone(),
        }
    }
}

/// Result of a worker that ran to completion with exit code zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub exit_code: i64,
    /// Raw stdout and stderr bytes, interleaved in arrival order
    pub output: Vec<u8>,
}

#[derive(Clone)]
pub struct WorkerExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    timeout: Option<Duration>,
}

impl WorkerExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            timeout: None,
        }
    }

    /// Bound the wait and log collection phase. Without it a worker may run
    /// for as long as its command takes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self, spec: &WorkerSpec) -> Result<WorkerOutcome, OperationError> {
        self.ensure_image(&spec.image).await?;

        let id = self
            .runtime
            .create_container(&spec.create_spec())
            .await
            .map_err(|source| OperationError::WorkerCreate {
                image: spec.image.to_string(),
                source,
            })?;
        debug!(container = %id.short(), image = %spec.image, binds = ?spec.binds, "created worker");

        if let Err(source) = self.runtime.start_container(&id).await {
            // Nothing ran yet, so the container is only an orphan to discard.
            self.discard(&id).await;
            return Err(OperationError::WorkerStart { container: id, source });
        }

        let finished = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.collect(&id)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(container = %id.short(), "worker exceeded its deadline");
                    self.discard(&id).await;
                    return Err(OperationError::TimedOut {
                        container: id,
                        after: limit,
                    });
                }
            },
            None => self.collect(&id).await,
        };

        let (exit_code, output) = match finished {
            Ok(v) => v,
            Err(e) => {
                self.discard(&id).await;
                return Err(e);
            }
        };

        let committed = match (&spec.commit, exit_code) {
            (Some(image), 0) => self
                .runtime
                .commit_container(&id, image, &spec.labels)
                .await
                .map_err(|source| OperationError::WorkerCommit {
                    container: id.clone(),
                    image: image.clone(),
                    source,
                }),
            _ => Ok(()),
        };

        let removed = self.runtime.remove_container(&id, false).await;

        if exit_code != 0 {
            if let Err(e) = removed {
                warn!(container = %id.short(), error = %e, "failed to remove worker");
            }
            return Err(OperationError::WorkerExitNonZero {
                container: id,
                code: exit_code,
            });
        }
        if let Err(e) = committed {
            if let Err(remove_err) = removed {
                warn!(container = %id.short(), error = %remove_err, "failed to remove worker");
            }
            return Err(e);
        }
        removed.map_err(|source| OperationError::WorkerRemove {
            container: id.clone(),
            source,
        })?;

        info!(container = %id.short(), image = %spec.image, "worker finished");
        Ok(WorkerOutcome { exit_code, output })
    }

    /// Make sure `image` is available locally, pulling it when missing.
    pub async fn ensure_image(&self, image: &ImageRef) -> Result<(), OperationError> {
        let present = match self.runtime.image_exists(image).await {
            Ok(present) => present,
            Err(e) => {
                debug!(image = %image, error = %e, "image inspection failed; pulling");
                false
            }
        };
        if present {
            return Ok(());
        }

        self.runtime
            .pull_image(image, None)
            .await
            .map_err(|source| OperationError::ImageUnavailable {
                image: image.to_string(),
                source,
            })
    }

    async fn collect(&self, id: &ContainerId) -> Result<(i64, Vec<u8>), OperationError> {
        let exit_code = self
            .runtime
            .wait_container(id)
            .await
            .map_err(|source| OperationError::WorkerWait {
                container: id.clone(),
                source,
            })?;
        debug!(container = %id.short(), exit_code, "worker exited");

        let chunks = self
            .runtime
            .logs(id)
            .await
            .map_err(|source| OperationError::WorkerLogs {
                container: id.clone(),
                source,
            })?;

        Ok((exit_code, forward_output(id, &chunks)))
    }

    async fn discard(&self, id: &ContainerId) {
        if let Err(e) = self.runtime.remove_container(id, true).await {
            warn!(container = %id.short(), error = %e, "failed to discard worker container");
        }
    }
}

/// Send worker output to the diagnostic log and return the combined bytes.
fn forward_output(id: &ContainerId, chunks: &[LogChunk]) -> Vec<u8> {
    let mut combined = Vec::new();
    for chunk in chunks {
        let text = String::from_utf8_lossy(chunk.bytes());
        for line in text.lines().filter(|l| !l.is_empty()) {
            match chunk {
                LogChunk::Stdout(_) => debug!(container = %id.short(), stream = "stdout", "{}", line),
                LogChunk::Stderr(_) => debug!(container = %id.short(), stream = "stderr", "{}", line),
            }
        }
        combined.extend_from_slice(chunk.bytes());
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let image = ImageRef::new("busybox").unwrap();
        let spec = WorkerSpec::shell(image, "true")
            .bind("a", "/from")
            .bind_ro("b", "/to")
            .user("root");
        assert_eq!(spec.command, vec!["/bin/sh", "-c", "true"]);
        assert_eq!(spec.binds, vec!["a:/from", "b:/to:ro"]);
        assert_eq!(spec.user.as_deref(), Some("root"));
        assert!(spec.commit.is_none());
    }

    #[test]
    fn test_forward_output_keeps_raw_bytes() {
        let id = ContainerId::new("abc").unwrap();
        let chunks = vec![
            LogChunk::Stdout(b"a\n".to_vec()),
            LogChunk::Stderr(b"b\n".to_vec()),
        ];
        assert_eq!(forward_output(&id, &chunks), b"a\nb\n".to_vec());
    }
}
