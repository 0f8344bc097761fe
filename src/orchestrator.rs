//! Runs validated operations through one fixed pipeline.
//!
//! ```text
//! Idle -> Validating -> DependentsStopped -> ActionRunning
//!      -> DependentsRestarted -> Completed | Failed
//! ```
//!
//! Every operation, whatever its kind, records progress, suspends the
//! containers using its volumes, performs its [`Action`], restarts the
//! suspended containers and finally clears its progress entry. The restart
//! is attempted even when stopping or the action failed.
use crate::guard::{DependentSet, LifecycleGuard};
use crate::notify::{LogNotifier, Notification, Notifier, Phase};
use crate::operation::{Action, Operation, OperationError, TransferAction};
use crate::prefetch::{PrefetchReport, prefetch};
use crate::progress::ProgressTracker;
use crate::runtime::ContainerRuntime;
use crate::transfer::RegistryTransfer;
use crate::types::{ContainerId, ImageRef, OperationKind, VolumeName};
use crate::worker::{WorkerExecutor, WorkerOutcome};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_HELPER_IMAGE: &str = "docker.io/library/busybox:latest";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Image used for clone, import, export and save workers
    pub worker_image: ImageRef,
    /// Images pulled ahead of time by [`Orchestrator::prefetch`]
    pub helper_images: Vec<ImageRef>,
    pub exclusive: bool,
    pub worker_timeout: Option<Duration>,
}

impl OrchestratorConfig {
    pub fn new(worker_image: ImageRef) -> Self {
        Self {
            helper_images: vec![worker_image.clone()],
            worker_image,
            exclusive: true,
            worker_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Validating,
    DependentsStopped,
    ActionRunning,
    DependentsRestarted,
    Completed,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Validating => "validating",
            State::DependentsStopped => "dependents_stopped",
            State::ActionRunning => "action_running",
            State::DependentsRestarted => "dependents_restarted",
            State::Completed => "completed",
            State::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Summary of a successful operation.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub volume: VolumeName,
    pub kind: OperationKind,
    pub exit_code: i64,
    /// Containers that were suspended and started again
    pub restarted: Vec<ContainerId>,
    /// Combined worker output
    pub output: Vec<u8>,
}

#[derive(Clone)]
pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    tracker: Arc<ProgressTracker>,
    guard: LifecycleGuard,
    worker: WorkerExecutor,
    transfer: RegistryTransfer,
    notifier: Arc<dyn Notifier>,
    config: Arc<OrchestratorConfig>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: OrchestratorConfig) -> Self {
        let tracker = if config.exclusive {
            ProgressTracker::exclusive()
        } else {
            ProgressTracker::advisory()
        };
        let worker =
            WorkerExecutor::new(Arc::clone(&runtime)).with_timeout(config.worker_timeout);
        let transfer = RegistryTransfer::new(
            Arc::clone(&runtime),
            worker.clone(),
            config.worker_image.clone(),
        );
        Self {
            guard: LifecycleGuard::new(Arc::clone(&runtime)),
            tracker: Arc::new(tracker),
            worker,
            transfer,
            notifier: Arc::new(LogNotifier),
            config: Arc::new(config),
            in_flight: Arc::new(watch::channel(0).0),
            runtime,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Operations currently in flight.
    pub fn progress(&self) -> BTreeMap<VolumeName, OperationKind> {
        self.tracker.snapshot()
    }

    /// Make sure the configured helper images are present locally.
    pub async fn prefetch(&self) -> PrefetchReport {
        prefetch(Arc::clone(&self.runtime), &self.config.helper_images).await
    }

    /// Run an operation on its own task.
    ///
    /// The operation counts as in flight from the moment it is spawned, so
    /// [`Orchestrator::drain`] waits for it even before its first poll.
    pub fn spawn(&self, op: Operation) -> JoinHandle<Result<OperationOutcome, OperationError>> {
        let ticket = InFlight::new(Arc::clone(&self.in_flight));
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let _ticket = ticket;
            orchestrator.execute(op).await
        })
    }

    /// Number of spawned operations that have not finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Wait until every spawned operation has finished.
    pub async fn drain(&self) {
        let mut rx = self.in_flight.subscribe();
        // Cannot close while `self` holds the sender.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub async fn execute(&self, op: Operation) -> Result<OperationOutcome, OperationError> {
        let kind = op.kind();
        let volume = op.volume().clone();
        transition(&volume, kind, State::Validating);

        let progress = self.tracker.begin(&op.volumes(), kind)?;
        self.notify(&volume, kind, Phase::Started).await;

        let (dependents, stopped) = self.stop_all(&op).await;

        let result = match stopped {
            Ok(()) => {
                transition(&volume, kind, State::DependentsStopped);
                transition(&volume, kind, State::ActionRunning);
                self.perform(&op).await
            }
            Err(e) => Err(e),
        };

        let restarted = self.guard.start_dependents(&dependents).await;
        transition(&volume, kind, State::DependentsRestarted);

        let result = match (result, restarted) {
            (Ok(outcome), Ok(())) => Ok(OperationOutcome {
                volume: volume.clone(),
                kind,
                exit_code: outcome.exit_code,
                restarted: dependents.containers().to_vec(),
                output: outcome.output,
            }),
            (Ok(_), Err(restart)) => Err(restart),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restart)) => {
                warn!(volume = %volume, error = %restart, "dependents not restarted after failed {}", kind);
                Err(e)
            }
        };

        drop(progress);

        match &result {
            Ok(outcome) => {
                transition(&volume, kind, State::Completed);
                info!(volume = %volume, kind = %kind, restarted = outcome.restarted.len(), "operation completed");
                self.notify(&volume, kind, Phase::Completed).await;
            }
            Err(e) => {
                transition(&volume, kind, State::Failed);
                warn!(volume = %volume, kind = %kind, error = %e, "operation failed");
                self.notify(&volume, kind, Phase::Failed).await;
            }
        }
        result
    }

    /// Suspend the consumers of every volume the operation touches.
    ///
    /// Always returns the containers actually stopped, even alongside an
    /// error, so they can be restarted.
    async fn stop_all(&self, op: &Operation) -> (DependentSet, Result<(), OperationError>) {
        let mut dependents = DependentSet::default();
        for volume in op.volumes() {
            match self.guard.stop_dependents(&volume).await {
                Ok(set) => dependents.extend(set),
                Err(OperationError::DependencyStop {
                    volume,
                    container,
                    stopped,
                    source,
                }) => {
                    dependents.extend(DependentSet::new(volume.clone(), stopped.clone()));
                    return (
                        dependents,
                        Err(OperationError::DependencyStop {
                            volume,
                            container,
                            stopped,
                            source,
                        }),
                    );
                }
                Err(e) => return (dependents, Err(e)),
            }
        }
        (dependents, Ok(()))
    }

    async fn perform(&self, op: &Operation) -> Result<WorkerOutcome, OperationError> {
        let volume = op.volume();
        let kind = op.kind();
        match op.plan(&self.config.worker_image) {
            Action::Worker(spec) => self.worker.run(&spec).await,
            Action::Transfer(TransferAction::Save { image }) => {
                self.transfer.save_volume_to_image(volume, &image, kind).await
            }
            Action::Transfer(TransferAction::Load { image }) => {
                self.transfer.load_volume_from_image(volume, &image, kind).await
            }
            Action::Transfer(TransferAction::Pull { image, auth }) => {
                self.transfer.pull(volume, &image, auth.as_ref()).await
            }
            Action::Transfer(TransferAction::Push { image, auth }) => {
                self.transfer.push(volume, &image, auth.as_ref()).await
            }
        }
    }

    async fn notify(&self, volume: &VolumeName, kind: OperationKind, phase: Phase) {
        let event = Notification {
            volume: volume.clone(),
            kind,
            phase,
        };
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(volume = %volume, error = %e, "failed to deliver notification");
        }
    }
}

struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn new(counter: Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n -= 1);
    }
}

fn transition(volume: &VolumeName, kind: OperationKind, state: State) {
    debug!(volume = %volume, kind = %kind, state = %state, "operation state");
}
