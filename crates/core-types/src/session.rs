//! Per-tour playback session state
//!
//! Holds the marker -> block maps written by `insertBlock`, the current step
//! index used to scope them, and the identity of the element most recently
//! seen by an `elementAppear` watcher. One session lives for one tour
//! playback and is cleared when the tour ends.
//!
//! Every `clear()` starts a new epoch. Writers that captured an older epoch
//! before an `.await` have their writes dropped, so a setup still running
//! when its tour ends cannot leak handles into the next one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct SessionState {
    epoch: u64,
    current_step: Option<usize>,
    inserted: HashMap<String, String>,
    inserted_by_step: HashMap<usize, HashMap<String, String>>,
    last_inserted: Option<String>,
    last_appeared: Option<String>,
}

/// Cheaply cloneable handle to the shared session state.
#[derive(Clone, Debug, Default)]
pub struct PlaybackSession {
    inner: Arc<Mutex<SessionState>>,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the step now being set up; scopes per-step marker lookups.
    pub fn enter_step(&self, index: usize) {
        self.inner.lock().current_step = Some(index);
    }

    pub fn current_step(&self) -> Option<usize> {
        self.inner.lock().current_step
    }

    /// Tour epoch; bumped by every `clear()`.
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Remember a block inserted under `marker` for the current step and globally.
    pub fn record_insert(&self, marker: &str, block_id: &str) {
        let epoch = self.epoch();
        self.record_insert_at(epoch, marker, block_id);
    }

    /// `record_insert`, dropped when the session was cleared since `epoch`.
    pub fn record_insert_at(&self, epoch: u64, marker: &str, block_id: &str) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        state.record_step_marker(marker, block_id);
        state
            .inserted
            .insert(marker.to_string(), block_id.to_string());
        true
    }

    /// Record an adopted block under the current step only.
    pub fn record_adopted(&self, marker: &str, block_id: &str) {
        let epoch = self.epoch();
        self.record_adopted_at(epoch, marker, block_id);
    }

    pub fn record_adopted_at(&self, epoch: u64, marker: &str, block_id: &str) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        state.record_step_marker(marker, block_id);
        true
    }

    pub fn step_marker(&self, step: usize, marker: &str) -> Option<String> {
        self.inner
            .lock()
            .inserted_by_step
            .get(&step)
            .and_then(|markers| markers.get(marker))
            .cloned()
    }

    /// Marker lookup scoped to the current step.
    pub fn current_step_marker(&self, marker: &str) -> Option<String> {
        let state = self.inner.lock();
        let step = state.current_step?;
        state
            .inserted_by_step
            .get(&step)
            .and_then(|markers| markers.get(marker))
            .cloned()
    }

    pub fn global_marker(&self, marker: &str) -> Option<String> {
        self.inner.lock().inserted.get(marker).cloned()
    }

    /// Drop a stale mapping whose block no longer exists.
    pub fn forget_marker(&self, marker: &str) {
        let epoch = self.epoch();
        self.forget_marker_at(epoch, marker);
    }

    pub fn forget_marker_at(&self, epoch: u64, marker: &str) {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return;
        }
        if let Some(step) = state.current_step {
            if let Some(markers) = state.inserted_by_step.get_mut(&step) {
                markers.remove(marker);
            }
        }
        state.inserted.remove(marker);
    }

    /// Whether `block_id` is recorded under any marker other than `marker`.
    pub fn is_claimed_by_other(&self, block_id: &str, marker: &str) -> bool {
        let state = self.inner.lock();
        let claimed = |markers: &HashMap<String, String>| {
            markers
                .iter()
                .any(|(key, id)| id == block_id && key != marker)
        };
        claimed(&state.inserted) || state.inserted_by_step.values().any(claimed)
    }

    pub fn last_inserted(&self) -> Option<String> {
        self.inner.lock().last_inserted.clone()
    }

    pub fn set_last_appeared(&self, identity: impl Into<String>) {
        self.inner.lock().last_appeared = Some(identity.into());
    }

    pub fn last_appeared(&self) -> Option<String> {
        self.inner.lock().last_appeared.clone()
    }

    pub fn inserted_count(&self) -> usize {
        self.inner.lock().inserted.len()
    }

    /// Tour ended: forget every handle so nothing leaks into the next tour.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        let epoch = state.epoch + 1;
        *state = SessionState {
            epoch,
            ..SessionState::default()
        };
    }
}

impl SessionState {
    fn record_step_marker(&mut self, marker: &str, block_id: &str) {
        if let Some(step) = self.current_step {
            self.inserted_by_step
                .entry(step)
                .or_default()
                .insert(marker.to_string(), block_id.to_string());
        }
        self.last_inserted = Some(block_id.to_string());
    }
}
