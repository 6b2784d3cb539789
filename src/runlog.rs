//! Append-only log trail carried through one orchestration run.
//!
//! Every component appends human-readable entries here; the final success
//! or error payload ships the whole trail back to the caller for
//! postmortem diagnosis. Entries are mirrored as `tracing` events.

use std::sync::{Arc, Mutex};

use chrono::Utc;

/// Cheaply cloneable handle to a run's log trail.
///
/// The trail is append-only until the run ends; clones share the same
/// underlying buffer so collaborators can log without threading mutable
/// borrows through every call.
#[derive(Clone, Debug, Default)]
pub struct RunLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    /// Creates an empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a timestamped entry and emits it as a `tracing` event.
    pub fn push(&self, message: impl AsRef<str>) {
        let message_ref = message.as_ref();
        let entry = format!("[{}] {message_ref}", Utc::now().to_rfc2822());
        tracing::info!(target: "aerolog::run", "{message_ref}");
        self.lock().push(entry);
    }

    /// Returns a snapshot of the accumulated entries in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the trail is still empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
