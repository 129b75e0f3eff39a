use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSnapshot {
    pub status: InitStatus,
    pub message: String,
    pub updated_at: String,
}

impl InitSnapshot {
    fn new(status: InitStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Process-wide initialization phase.
///
/// Readers get a cloned snapshot; writers replace the whole snapshot under
/// the lock. Phases only move forward: `Uninitialized -> Initializing ->
/// Ready | Failed`.
#[derive(Clone)]
pub struct InitState {
    inner: Arc<RwLock<InitSnapshot>>,
}

impl Default for InitState {
    fn default() -> Self {
        Self::new()
    }
}

impl InitState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(InitSnapshot::new(
                InitStatus::Uninitialized,
                "System is starting up...",
            ))),
        }
    }

    pub fn snapshot(&self) -> InitSnapshot {
        self.read().clone()
    }

    pub fn status(&self) -> InitStatus {
        self.read().status
    }

    /// Moves `Uninitialized -> Initializing`. Returns false if another
    /// caller already started.
    pub fn begin(&self, message: &str) -> bool {
        let mut guard = self.write();
        if guard.status != InitStatus::Uninitialized {
            return false;
        }
        *guard = InitSnapshot::new(InitStatus::Initializing, message);
        true
    }

    /// Progress note while initializing; ignored in any other phase.
    pub fn set_message(&self, message: &str) {
        let mut guard = self.write();
        if guard.status == InitStatus::Initializing {
            *guard = InitSnapshot::new(InitStatus::Initializing, message);
        }
    }

    pub fn mark_ready(&self, message: &str) -> bool {
        self.finish(InitStatus::Ready, message)
    }

    pub fn mark_failed(&self, message: &str) -> bool {
        self.finish(InitStatus::Failed, message)
    }

    fn finish(&self, status: InitStatus, message: &str) -> bool {
        let mut guard = self.write();
        if guard.status != InitStatus::Initializing {
            return false;
        }
        *guard = InitSnapshot::new(status, message);
        true
    }

    fn read(&self) -> RwLockReadGuard<'_, InitSnapshot> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InitSnapshot> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized() {
        let state = InitState::new();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, InitStatus::Uninitialized);
        assert!(!snapshot.message.is_empty());
    }

    #[test]
    fn begin_only_succeeds_once() {
        let state = InitState::new();
        assert!(state.begin("Loading RAG engine..."));
        assert!(!state.begin("again"));
        assert_eq!(state.snapshot().message, "Loading RAG engine...");
    }

    #[test]
    fn terminal_phases_are_final() {
        let state = InitState::new();
        assert!(!state.mark_ready("too early"));

        state.begin("starting");
        state.set_message("Embedding 12 chunks...");
        assert_eq!(state.snapshot().message, "Embedding 12 chunks...");

        assert!(state.mark_failed("Fatal error during initialization: boom"));
        assert!(!state.mark_ready("late"));
        state.set_message("ignored");

        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, InitStatus::Failed);
        assert_eq!(snapshot.message, "Fatal error during initialization: boom");
    }

    #[test]
    fn clones_share_the_same_cell() {
        let state = InitState::new();
        let reader = state.clone();
        state.begin("starting");
        state.mark_ready("System is ready to answer questions.");
        assert_eq!(reader.status(), InitStatus::Ready);
    }

    #[test]
    fn status_serializes_in_snake_case() {
        let json = serde_json::to_value(InitStatus::Initializing).unwrap();
        assert_eq!(json, serde_json::json!("initializing"));
    }
}
