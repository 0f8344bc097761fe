//! Hooks for telling a front end that volume state changed.
//!
//! Delivery is fire-and-forget: the orchestrator logs a failed notification
//! and moves on.
use crate::types::{OperationKind, VolumeName};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Started,
    Completed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Started => "started",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub volume: VolumeName,
    pub kind: OperationKind,
    pub phase: Phase,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Notification) -> anyhow::Result<()> {
        info!(volume = %event.volume, kind = %event.kind, phase = %event.phase, "volume state changed");
        Ok(())
    }
}
