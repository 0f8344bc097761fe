//! Registry of operations currently in flight, keyed by volume.
//!
//! The tracker is created once at process start and shared through an `Arc`.
//! Callers never see the underlying map; they record work through
//! [`ProgressTracker::begin`], which hands back a [`ProgressGuard`] that clears
//! the entry when dropped. Dropping happens on success, on error, and while
//! unwinding from a panic, so an entry can never outlive its operation.
use crate::types::{OperationKind, VolumeName};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("volume '{volume}' is busy with a running {active} operation")]
pub struct VolumeBusy {
    pub volume: VolumeName,
    pub active: OperationKind,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    entries: Mutex<HashMap<VolumeName, OperationKind>>,
    exclusive: bool,
}

impl ProgressTracker {
    /// A tracker that only records progress; overlapping operations on one
    /// volume are allowed and the latest one wins the entry.
    pub fn advisory() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            exclusive: false,
        }
    }

    /// A tracker that also acts as a per-volume gate, rejecting a second
    /// operation while one is active.
    pub fn exclusive() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            exclusive: true,
        }
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn set(&self, volume: VolumeName, kind: OperationKind) {
        self.entries.lock().insert(volume, kind);
    }

    pub fn clear(&self, volume: &VolumeName) {
        self.entries.lock().remove(volume);
    }

    pub fn get(&self, volume: &VolumeName) -> Option<OperationKind> {
        self.entries.lock().get(volume).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<VolumeName, OperationKind> {
        self.entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Record `kind` as active for every volume in `volumes`.
    ///
    /// In exclusive mode the whole set is checked and inserted under one lock
    /// acquisition, so two operations can never each claim half of a set.
    pub fn begin(
        self: &Arc<Self>,
        volumes: &[VolumeName],
        kind: OperationKind,
    ) -> Result<ProgressGuard, VolumeBusy> {
        let mut entries = self.entries.lock();
        if self.exclusive {
            if let Some((volume, active)) = volumes
                .iter()
                .find_map(|v| entries.get(v).map(|k| (v.clone(), *k)))
            {
                return Err(VolumeBusy { volume, active });
            }
        }
        for volume in volumes {
            entries.insert(volume.clone(), kind);
        }
        drop(entries);

        Ok(ProgressGuard {
            tracker: Arc::clone(self),
            volumes: volumes.to_vec(),
        })
    }
}

/// Clears the tracked entries when dropped.
#[derive(Debug)]
pub struct ProgressGuard {
    tracker: Arc<ProgressTracker>,
    volumes: Vec<VolumeName>,
}

impl ProgressGuard {
    pub fn volumes(&self) -> &[VolumeName] {
        &self.volumes
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        let mut entries = self.tracker.entries.lock();
        for volume in &self.volumes {
            entries.remove(volume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vol(name: &str) -> VolumeName {
        VolumeName::new(name).unwrap()
    }

    #[test]
    fn test_set_clear_snapshot() {
        let tracker = ProgressTracker::advisory();
        tracker.set(vol("a"), OperationKind::Clone);
        tracker.set(vol("b"), OperationKind::Export);

        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[&vol("a")], OperationKind::Clone);

        tracker.clear(&vol("a"));
        tracker.clear(&vol("missing"));
        assert_eq!(tracker.get(&vol("a")), None);
        assert_eq!(tracker.get(&vol("b")), Some(OperationKind::Export));
    }

    #[test]
    fn test_guard_clears_on_drop() {
        let tracker = Arc::new(ProgressTracker::exclusive());
        {
            let _guard = tracker
                .begin(&[vol("a"), vol("b")], OperationKind::Clone)
                .unwrap();
            assert_eq!(tracker.snapshot().len(), 2);
        }
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn test_guard_clears_on_panic() {
        let tracker = Arc::new(ProgressTracker::exclusive());
        let t = Arc::clone(&tracker);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = t.begin(&[vol("a")], OperationKind::Import).unwrap();
            panic!("worker blew up");
        }));
        assert!(result.is_err());
        assert!(tracker.get(&vol("a")).is_none());
    }

    #[test]
    fn test_exclusive_rejects_overlap() {
        let tracker = Arc::new(ProgressTracker::exclusive());
        let _held = tracker.begin(&[vol("a")], OperationKind::Save).unwrap();

        let err = tracker
            .begin(&[vol("b"), vol("a")], OperationKind::Clone)
            .unwrap_err();
        assert_eq!(err.volume, vol("a"));
        assert_eq!(err.active, OperationKind::Save);
        // The rejected request must not leave a partial claim on "b".
        assert_eq!(tracker.get(&vol("b")), None);
    }

    #[test]
    fn test_advisory_allows_overlap() {
        let tracker = Arc::new(ProgressTracker::advisory());
        let first = tracker.begin(&[vol("a")], OperationKind::Save).unwrap();
        let second = tracker.begin(&[vol("a")], OperationKind::Load).unwrap();
        assert_eq!(tracker.get(&vol("a")), Some(OperationKind::Load));
        drop(first);
        drop(second);
        assert!(tracker.snapshot().is_empty());
    }
}
