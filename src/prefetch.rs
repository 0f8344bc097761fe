//! Startup warm-up of helper images.
//!
//! Prefetching only saves the first operation from waiting on a pull. It is
//! never a precondition: a failed prefetch is logged and the worker will try
//! to pull the image again when it actually needs it.
use crate::runtime::ContainerRuntime;
use crate::types::ImageRef;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrefetchReport {
    pub present: Vec<ImageRef>,
    pub pulled: Vec<ImageRef>,
    pub failed: Vec<ImageRef>,
}

impl PrefetchReport {
    pub fn total(&self) -> usize {
        self.present.len() + self.pulled.len() + self.failed.len()
    }
}

enum Fetched {
    Present,
    Pulled,
    Failed,
}

/// Check every image concurrently and pull the missing ones.
///
/// Returns once all checks and pulls have finished.
pub async fn prefetch(runtime: Arc<dyn ContainerRuntime>, images: &[ImageRef]) -> PrefetchReport {
    let mut tasks = JoinSet::new();
    let mut pending = HashMap::new();
    for image in images.iter().cloned() {
        let runtime = Arc::clone(&runtime);
        let task = image.clone();
        let handle = tasks.spawn(async move { fetch_one(runtime.as_ref(), &task).await });
        pending.insert(handle.id(), image);
    }

    let mut report = PrefetchReport::default();
    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(e) => {
                warn!(error = %e, "prefetch task aborted");
                (e.id(), Fetched::Failed)
            }
        };
        let Some(image) = pending.remove(&id) else {
            continue;
        };
        match outcome {
            Fetched::Present => report.present.push(image),
            Fetched::Pulled => report.pulled.push(image),
            Fetched::Failed => report.failed.push(image),
        }
    }

    if report.failed.is_empty() {
        info!(
            present = report.present.len(),
            pulled = report.pulled.len(),
            "helper images ready"
        );
    } else {
        warn!(
            failed = ?report.failed.iter().map(ImageRef::as_str).collect::<Vec<_>>(),
            "some helper images could not be prefetched"
        );
    }
    report
}

async fn fetch_one(runtime: &dyn ContainerRuntime, image: &ImageRef) -> Fetched {
    match runtime.image_exists(image).await {
        Ok(true) => {
            debug!(image = %image, "helper image already present");
            return Fetched::Present;
        }
        Ok(false) => {}
        Err(e) => debug!(image = %image, error = %e, "cannot inspect helper image"),
    }

    info!(image = %image, "pulling helper image");
    match runtime.pull_image(image, None).await {
        Ok(()) => Fetched::Pulled,
        Err(e) => {
            warn!(image = %image, error = %e, "failed to prefetch helper image");
            Fetched::Failed
        }
    }
}
