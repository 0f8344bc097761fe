//! Suspends and resumes the containers that depend on a volume.
//!
//! A volume must never be written underneath a running consumer. Before an
//! operation mutates a volume, [`LifecycleGuard::stop_dependents`] captures the
//! running containers bound to it and stops them; afterwards
//! [`LifecycleGuard::start_dependents`] restarts exactly that captured set.
//! The set is never re-queried, so containers started by someone else in the
//! meantime are left alone.
use crate::operation::OperationError;
use crate::runtime::ContainerRuntime;
use crate::types::{ContainerId, VolumeName};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Containers that were running against a volume when an operation began.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentSet {
    volume: Option<VolumeName>,
    containers: Vec<ContainerId>,
}

impl DependentSet {
    pub fn new(volume: VolumeName, containers: Vec<ContainerId>) -> Self {
        Self {
            volume: Some(volume),
            containers,
        }
    }

    pub fn containers(&self) -> &[ContainerId] {
        &self.containers
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Merge another set, skipping containers already present.
    pub fn extend(&mut self, other: DependentSet) {
        for id in other.containers {
            if !self.containers.contains(&id) {
                self.containers.push(id);
            }
        }
    }
}

#[derive(Clone)]
pub struct LifecycleGuard {
    runtime: Arc<dyn ContainerRuntime>,
}

impl LifecycleGuard {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Stop every running container bound to `volume`.
    ///
    /// Fails before touching anything if the containers cannot be listed, and
    /// aborts on the first container that refuses to stop. In the latter case
    /// the error carries the containers already stopped so they can be resumed.
    pub async fn stop_dependents(&self, volume: &VolumeName) -> Result<DependentSet, OperationError> {
        let containers = self.runtime.list_containers(volume).await.map_err(|source| {
            OperationError::DependencyEnumeration {
                volume: volume.clone(),
                source,
            }
        })?;

        let running: Vec<ContainerId> = containers
            .into_iter()
            .filter(|c| c.is_running())
            .map(|c| c.id)
            .collect();

        if running.is_empty() {
            debug!(volume = %volume, "no running containers use the volume");
            return Ok(DependentSet::new(volume.clone(), running));
        }

        let mut stopped = Vec::with_capacity(running.len());
        for id in running {
            info!(volume = %volume, container = %id.short(), "stopping dependent container");
            if let Err(source) = self.runtime.stop_container(&id).await {
                return Err(OperationError::DependencyStop {
                    volume: volume.clone(),
                    container: id,
                    stopped,
                    source,
                });
            }
            stopped.push(id);
        }

        Ok(DependentSet::new(volume.clone(), stopped))
    }

    /// Start every container in `set`, continuing past individual failures.
    pub async fn start_dependents(&self, set: &DependentSet) -> Result<(), OperationError> {
        let mut failed = Vec::new();
        for id in set.containers() {
            match self.runtime.start_container(id).await {
                Ok(()) => {
                    info!(volume = ?set.volume.as_deref(), container = %id.short(), "restarted dependent container")
                }
                Err(e) => {
                    warn!(container = %id.short(), error = %e, "failed to restart dependent container");
                    failed.push((id.clone(), e));
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(OperationError::DependencyStart { failed })
        }
    }
}
