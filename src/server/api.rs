use crate::orchestrator::OperationOutcome;
use crate::types::{ContainerId, OperationKind, VolumeName};
use serde::Serialize;
use std::collections::BTreeMap;

/// Body of `GET /progress`: volume name to the operation running on it.
pub type ProgressResponse = BTreeMap<VolumeName, OperationKind>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub volume: VolumeName,
    pub kind: OperationKind,
    pub restarted_containers: Vec<ContainerId>,
}

impl From<OperationOutcome> for OperationResponse {
    fn from(outcome: OperationOutcome) -> Self {
        Self {
            volume: outcome.volume,
            kind: outcome.kind,
            restarted_containers: outcome.restarted,
        }
    }
}
