//! Moving volume contents in and out of images.
//!
//! A volume is snapshotted by copying it into `/volume-data` inside a helper
//! container and committing that container as an image. Restoring runs the
//! snapshot image itself with the volume mounted and copies the data back.
//! Pull and push wrap those two primitives with a registry transfer.
use crate::operation::{OperationError, labels};
use crate::runtime::{ContainerRuntime, RegistryAuth};
use crate::types::{ImageRef, OperationKind, VolumeName};
use crate::worker::{WorkerExecutor, WorkerOutcome, WorkerSpec};
use std::sync::Arc;
use tracing::info;

/// Directory inside a snapshot image that holds the volume contents.
pub const SNAPSHOT_DIR: &str = "/volume-data";
const VOLUME_MOUNT: &str = "/volume";

/// Empties the mounted volume, dot files included, without removing the mount point.
pub(crate) const WIPE_VOLUME: &str = "rm -rf /volume/..?* /volume/.[!.]* /volume/*";

#[derive(Clone)]
pub struct RegistryTransfer {
    runtime: Arc<dyn ContainerRuntime>,
    worker: WorkerExecutor,
    helper_image: ImageRef,
}

impl RegistryTransfer {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        worker: WorkerExecutor,
        helper_image: ImageRef,
    ) -> Self {
        Self {
            runtime,
            worker,
            helper_image,
        }
    }

    /// Snapshot `volume` into a local image tagged `image`.
    pub async fn save_volume_to_image(
        &self,
        volume: &VolumeName,
        image: &ImageRef,
        kind: OperationKind,
    ) -> Result<WorkerOutcome, OperationError> {
        info!(volume = %volume, image = %image, "saving volume into image");
        let spec = self.save_spec(volume, image, kind);
        self.worker.run(&spec).await
    }

    /// Replace the contents of `volume` with the snapshot stored in `image`.
    pub async fn load_volume_from_image(
        &self,
        volume: &VolumeName,
        image: &ImageRef,
        kind: OperationKind,
    ) -> Result<WorkerOutcome, OperationError> {
        info!(volume = %volume, image = %image, "loading volume from image");
        let spec = self.load_spec(volume, image, kind);
        self.worker.run(&spec).await
    }

    /// Pull `image` from its registry and load it into `volume`.
    pub async fn pull(
        &self,
        volume: &VolumeName,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<WorkerOutcome, OperationError> {
        self.runtime
            .pull_image(image, auth)
            .await
            .map_err(|e| OperationError::from_registry(image, e))?;
        self.load_volume_from_image(volume, image, OperationKind::Pull)
            .await
    }

    /// Snapshot `volume` as `image` and push it to its registry.
    pub async fn push(
        &self,
        volume: &VolumeName,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<WorkerOutcome, OperationError> {
        let outcome = self
            .save_volume_to_image(volume, image, OperationKind::Push)
            .await?;
        self.runtime
            .push_image(image, auth)
            .await
            .map_err(|e| OperationError::from_registry(image, e))?;
        info!(volume = %volume, image = %image, "pushed volume image");
        Ok(outcome)
    }

    pub fn save_spec(&self, volume: &VolumeName, image: &ImageRef, kind: OperationKind) -> WorkerSpec {
        WorkerSpec::shell(
            self.helper_image.clone(),
            format!("mkdir -p {SNAPSHOT_DIR} && cp -Rp {VOLUME_MOUNT}/. {SNAPSHOT_DIR}/"),
        )
        .bind_ro(volume, VOLUME_MOUNT)
        .labels(labels(kind, volume, [("image", image.as_str())]))
        .commit_as(image.clone())
    }

    pub fn load_spec(&self, volume: &VolumeName, image: &ImageRef, kind: OperationKind) -> WorkerSpec {
        WorkerSpec::shell(
            image.clone(),
            format!("{WIPE_VOLUME} && cp -Rp {SNAPSHOT_DIR}/. {VOLUME_MOUNT}/"),
        )
        .bind(volume, VOLUME_MOUNT)
        .labels(labels(kind, volume, [("image", image.as_str())]))
    }
}
