use crate::progress::VolumeBusy;
use crate::runtime::RuntimeError;
use crate::types::{ContainerId, ImageRef, VolumeName};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single volume operation.
///
/// None of these are retried internally; each carries enough context to be
/// reported to the caller as one human readable message.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error(transparent)]
    Busy(#[from] VolumeBusy),

    #[error("cannot determine containers using volume '{volume}': {source}")]
    DependencyEnumeration {
        volume: VolumeName,
        source: RuntimeError,
    },

    #[error("failed to stop container {} using volume '{volume}': {source}", .container.short())]
    DependencyStop {
        volume: VolumeName,
        container: ContainerId,
        /// Containers that were stopped before the failure and need restarting
        stopped: Vec<ContainerId>,
        source: RuntimeError,
    },

    #[error("failed to restart {} container(s): {}", .failed.len(), describe(.failed))]
    DependencyStart {
        failed: Vec<(ContainerId, RuntimeError)>,
    },

    #[error("image {image} is unavailable: {source}")]
    ImageUnavailable { image: String, source: RuntimeError },

    #[error("failed to create worker container from {image}: {source}")]
    WorkerCreate { image: String, source: RuntimeError },

    #[error("failed to start worker container {}: {source}", .container.short())]
    WorkerStart {
        container: ContainerId,
        source: RuntimeError,
    },

    #[error("failed waiting for worker container {}: {source}", .container.short())]
    WorkerWait {
        container: ContainerId,
        source: RuntimeError,
    },

    #[error("failed to collect output of worker container {}: {source}", .container.short())]
    WorkerLogs {
        container: ContainerId,
        source: RuntimeError,
    },

    #[error("container exited with status code {code}")]
    WorkerExitNonZero { container: ContainerId, code: i64 },

    #[error("failed to commit worker container {} as {image}: {source}", .container.short())]
    WorkerCommit {
        container: ContainerId,
        image: ImageRef,
        source: RuntimeError,
    },

    #[error("failed to remove worker container {}: {source}", .container.short())]
    WorkerRemove {
        container: ContainerId,
        source: RuntimeError,
    },

    #[error("registry rejected credentials for {image}: {message}")]
    RegistryAuth { image: ImageRef, message: String },

    #[error("registry transfer of {image} failed: {source}")]
    Transfer { image: ImageRef, source: RuntimeError },

    #[error("worker container {} did not finish within {}", .container.short(), elapsed(.after))]
    TimedOut {
        container: ContainerId,
        after: Duration,
    },
}

fn elapsed(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

fn describe(failed: &[(ContainerId, RuntimeError)]) -> String {
    failed
        .iter()
        .map(|(id, e)| format!("{} ({})", id.short(), e))
        .collect::<Vec<_>>()
        .join(", ")
}

impl OperationError {
    pub fn validation(field: &'static str, reason: impl ToString) -> Self {
        OperationError::Validation {
            field,
            reason: reason.to_string(),
        }
    }

    /// Stable identifier of the failure class, suitable for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::Validation { .. } => "validation",
            OperationError::Busy(_) => "busy",
            OperationError::DependencyEnumeration { .. } => "dependency_enumeration",
            OperationError::DependencyStop { .. } => "dependency_stop",
            OperationError::DependencyStart { .. } => "dependency_start",
            OperationError::ImageUnavailable { .. } => "image_unavailable",
            OperationError::WorkerCreate { .. } => "worker_create",
            OperationError::WorkerStart { .. } => "worker_start",
            OperationError::WorkerWait { .. } => "worker_wait",
            OperationError::WorkerLogs { .. } => "worker_logs",
            OperationError::WorkerExitNonZero { .. } => "worker_exit",
            OperationError::WorkerCommit { .. } => "worker_commit",
            OperationError::WorkerRemove { .. } => "worker_remove",
            OperationError::RegistryAuth { .. } => "unauthorized",
            OperationError::Transfer { .. } => "transfer",
            OperationError::TimedOut { .. } => "timeout",
        }
    }

    /// HTTP status used when the error is returned over the API.
    pub fn status(&self) -> u16 {
        match self {
            OperationError::Validation { .. } => 400,
            OperationError::RegistryAuth { .. } => 401,
            OperationError::Busy(_) => 409,
            _ => 500,
        }
    }

    /// Map a registry failure, keeping authorization problems distinct.
    pub(crate) fn from_registry(image: &ImageRef, source: RuntimeError) -> Self {
        match source {
            RuntimeError::Unauthorized(message) | RuntimeError::Credentials(message) => {
                OperationError::RegistryAuth {
                    image: image.clone(),
                    message,
                }
            }
            source => OperationError::Transfer {
                image: image.clone(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_unauthorized_maps_to_auth() {
        let image = ImageRef::new("ghcr.io/acme/data:1").unwrap();
        let err = OperationError::from_registry(
            &image,
            RuntimeError::Unauthorized("authentication required".into()),
        );
        assert_eq!(err.kind(), "unauthorized");
        assert_eq!(err.status(), 401);

        let err = OperationError::from_registry(&image, RuntimeError::Stream("boom".into()));
        assert_eq!(err.kind(), "transfer");
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn test_dependency_start_names_every_container() {
        let err = OperationError::DependencyStart {
            failed: vec![
                (
                    ContainerId::new("aaaaaaaaaaaaaaaa").unwrap(),
                    RuntimeError::NotFound("gone".into()),
                ),
                (
                    ContainerId::new("bbbbbbbbbbbbbbbb").unwrap(),
                    RuntimeError::Connection("reset".into()),
                ),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 container(s)"));
        assert!(msg.contains("aaaaaaaaaaaa"));
        assert!(msg.contains("bbbbbbbbbbbb"));
    }

    #[test]
    fn test_exit_code_message() {
        let err = OperationError::WorkerExitNonZero {
            container: ContainerId::new("c").unwrap(),
            code: 3,
        };
        assert_eq!(err.to_string(), "container exited with status code 3");
        assert_eq!(err.kind(), "worker_exit");
    }
}
