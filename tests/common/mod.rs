#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;
use volshift::notify::{Notification, Notifier};
use volshift::runtime::{
    ContainerRuntime, ContainerSummary, CreateSpec, LogChunk, RegistryAuth, RuntimeError,
};
use volshift::types::{ContainerId, ImageRef, VolumeName};

pub const BUSYBOX: &str = "docker.io/library/busybox:latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    Stop(String),
    Start(String),
    Create(CreateSpec),
    Remove { id: String, force: bool },
    Wait(String),
    Logs(String),
    ImageExists(String),
    Pull(String),
    Push(String),
    Commit { id: String, image: String },
}

#[derive(Default)]
struct State {
    /// volume -> [(container id, state)]
    containers: HashMap<String, Vec<(String, String)>>,
    images: HashSet<String>,
    exit_code: i64,
    logs: Vec<LogChunk>,
    fail_list: bool,
    fail_stop: HashSet<String>,
    fail_start: HashSet<String>,
    fail_worker_start: bool,
    fail_pull: HashSet<String>,
    panic_on_inspect: HashSet<String>,
    unauthorized: bool,
    wait_gate: Option<Arc<Notify>>,
    next_worker: usize,
    live_workers: HashSet<String>,
}

/// In-memory engine that records every call made against it.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<State>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().images.insert(BUSYBOX.to_string());
        fake
    }

    pub fn with_container(self, volume: &str, id: &str, state: &str) -> Self {
        self.state
            .lock()
            .containers
            .entry(volume.to_string())
            .or_default()
            .push((id.to_string(), state.to_string()));
        self
    }

    pub fn with_running(self, volume: &str, id: &str) -> Self {
        self.with_container(volume, id, "running")
    }

    pub fn with_exit_code(self, code: i64) -> Self {
        self.state.lock().exit_code = code;
        self
    }

    pub fn with_logs(self, logs: Vec<LogChunk>) -> Self {
        self.state.lock().logs = logs;
        self
    }

    pub fn without_images(self) -> Self {
        self.state.lock().images.clear();
        self
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state.lock().images.insert(image.to_string());
        self
    }

    pub fn failing_list(self) -> Self {
        self.state.lock().fail_list = true;
        self
    }

    pub fn failing_stop(self, id: &str) -> Self {
        self.state.lock().fail_stop.insert(id.to_string());
        self
    }

    pub fn failing_start(self, id: &str) -> Self {
        self.state.lock().fail_start.insert(id.to_string());
        self
    }

    pub fn failing_worker_start(self) -> Self {
        self.state.lock().fail_worker_start = true;
        self
    }

    pub fn failing_pull(self, image: &str) -> Self {
        self.state.lock().fail_pull.insert(image.to_string());
        self
    }

    /// Make inspecting `image` panic inside the runtime call.
    pub fn panicking_inspect(self, image: &str) -> Self {
        self.state.lock().panic_on_inspect.insert(image.to_string());
        self
    }

    pub fn unauthorized(self) -> Self {
        self.state.lock().unauthorized = true;
        self
    }

    /// Make worker waits block until the returned handle is notified.
    pub fn gated(self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.state.lock().wait_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Stop(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Non-worker containers that were started.
    pub fn started(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Start(id) if !id.starts_with("worker-") => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<CreateSpec> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<(String, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Remove { id, force } => Some((id, force)),
                _ => None,
            })
            .collect()
    }

    /// Position of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    pub fn live_workers(&self) -> usize {
        self.state.lock().live_workers.len()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn set_state(&self, id: &str, new_state: &str) {
        let mut state = self.state.lock();
        for containers in state.containers.values_mut() {
            for (cid, s) in containers.iter_mut() {
                if cid == id {
                    *s = new_state.to_string();
                }
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(
        &self,
        volume: &VolumeName,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.record(Call::List(volume.to_string()));
        let state = self.state.lock();
        if state.fail_list {
            return Err(RuntimeError::Connection("engine unreachable".into()));
        }
        Ok(state
            .containers
            .get(volume.as_str())
            .map(|cs| {
                cs.iter()
                    .map(|(id, s)| ContainerSummary {
                        id: ContainerId::new(id.clone()).unwrap(),
                        names: vec![format!("/{id}")],
                        state: s.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn stop_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.record(Call::Stop(id.to_string()));
        if self.state.lock().fail_stop.contains(id.as_str()) {
            return Err(RuntimeError::Api {
                status: 500,
                message: "cannot stop".into(),
            });
        }
        self.set_state(id.as_str(), "exited");
        Ok(())
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.record(Call::Start(id.to_string()));
        let state = self.state.lock();
        if id.as_str().starts_with("worker-") {
            if state.fail_worker_start {
                return Err(RuntimeError::Api {
                    status: 500,
                    message: "bind source path does not exist".into(),
                });
            }
            return Ok(());
        }
        if state.fail_start.contains(id.as_str()) {
            return Err(RuntimeError::NotFound(format!("no such container: {id}")));
        }
        drop(state);
        self.set_state(id.as_str(), "running");
        Ok(())
    }

    async fn create_container(&self, spec: &CreateSpec) -> Result<ContainerId, RuntimeError> {
        self.record(Call::Create(spec.clone()));
        let mut state = self.state.lock();
        state.next_worker += 1;
        let id = format!("worker-{}", state.next_worker);
        state.live_workers.insert(id.clone());
        Ok(ContainerId::new(id).unwrap())
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), RuntimeError> {
        self.record(Call::Remove {
            id: id.to_string(),
            force,
        });
        self.state.lock().live_workers.remove(id.as_str());
        Ok(())
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, RuntimeError> {
        self.record(Call::Wait(id.to_string()));
        let gate = self.state.lock().wait_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.state.lock().exit_code)
    }

    async fn logs(&self, id: &ContainerId) -> Result<Vec<LogChunk>, RuntimeError> {
        self.record(Call::Logs(id.to_string()));
        Ok(self.state.lock().logs.clone())
    }

    async fn image_exists(&self, image: &ImageRef) -> Result<bool, RuntimeError> {
        self.record(Call::ImageExists(image.to_string()));
        let panics = self.state.lock().panic_on_inspect.contains(image.as_str());
        if panics {
            panic!("inspect of {image} blew up");
        }
        Ok(self.state.lock().images.contains(image.as_str()))
    }

    async fn pull_image(
        &self,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), RuntimeError> {
        self.record(Call::Pull(image.to_string()));
        auth.map(RegistryAuth::decode).transpose()?;
        let mut state = self.state.lock();
        if state.unauthorized {
            return Err(RuntimeError::Unauthorized(
                "authentication required".into(),
            ));
        }
        if state.fail_pull.contains(image.as_str()) {
            return Err(RuntimeError::Stream("manifest unknown".into()));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn push_image(
        &self,
        image: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), RuntimeError> {
        self.record(Call::Push(image.to_string()));
        auth.map(RegistryAuth::decode).transpose()?;
        if self.state.lock().unauthorized {
            return Err(RuntimeError::Unauthorized("denied".into()));
        }
        Ok(())
    }

    async fn commit_container(
        &self,
        id: &ContainerId,
        image: &ImageRef,
        _labels: &HashMap<String, String>,
    ) -> Result<(), RuntimeError> {
        self.record(Call::Commit {
            id: id.to_string(),
            image: image.to_string(),
        });
        self.state.lock().images.insert(image.to_string());
        Ok(())
    }
}

/// Notifier that remembers every event and can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<Notification>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &Notification) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        if self.fail {
            anyhow::bail!("front end went away");
        }
        Ok(())
    }
}

pub fn vol(name: &str) -> VolumeName {
    VolumeName::new(name).unwrap()
}

pub fn image(reference: &str) -> ImageRef {
    ImageRef::new(reference).unwrap()
}
