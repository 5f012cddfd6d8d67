//! Sequence runs currently in flight, keyed by execution id, so a later
//! `stop_execution` call can cancel them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct ActiveRuns {
    runs: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a run until the returned guard is dropped.
    ///
    /// Returns `None` when a run with the same id is already active.
    pub fn register(&self, execution_id: Uuid, token: CancellationToken) -> Option<RunGuard> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        if runs.contains_key(&execution_id) {
            return None;
        }
        runs.insert(execution_id, token);
        debug!(execution_id = %execution_id, active = runs.len(), "Run registered");

        Some(RunGuard {
            runs: self.clone(),
            execution_id,
        })
    }

    /// Cancel one run. Returns false if it is not active.
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        match runs.get(&execution_id) {
            Some(token) => {
                info!(execution_id = %execution_id, "Stopping sequence run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active run and return their ids.
    pub fn cancel_all(&self) -> Vec<Uuid> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let mut stopped: Vec<Uuid> = runs
            .iter()
            .map(|(id, token)| {
                token.cancel();
                *id
            })
            .collect();
        stopped.sort();
        if !stopped.is_empty() {
            info!(count = stopped.len(), "Stopping all sequence runs");
        }
        stopped
    }

    pub fn is_active(&self, execution_id: Uuid) -> bool {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&execution_id)
    }

    pub fn len(&self) -> usize {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, execution_id: Uuid) {
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&execution_id);
    }
}

/// Unregisters its run on drop, including when the request future is
/// dropped mid-run.
pub struct RunGuard {
    runs: ActiveRuns,
    execution_id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.remove(self.execution_id);
        debug!(execution_id = %self.execution_id, "Run unregistered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_unregisters_on_drop() {
        let runs = ActiveRuns::new();
        let id = Uuid::new_v4();

        let guard = runs.register(id, CancellationToken::new()).unwrap();
        assert!(runs.is_active(id));
        assert_eq!(runs.len(), 1);

        drop(guard);
        assert!(!runs.is_active(id));
        assert!(runs.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_refused() {
        let runs = ActiveRuns::new();
        let id = Uuid::new_v4();

        let _guard = runs.register(id, CancellationToken::new()).unwrap();
        assert!(runs.register(id, CancellationToken::new()).is_none());
    }

    #[test]
    fn test_cancel_one() {
        let runs = ActiveRuns::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let (first_token, second_token) = (CancellationToken::new(), CancellationToken::new());
        let _a = runs.register(first, first_token.clone()).unwrap();
        let _b = runs.register(second, second_token.clone()).unwrap();

        assert!(runs.cancel(first));
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert!(!runs.cancel(Uuid::new_v4()));
    }

    #[test]
    fn test_cancel_all() {
        let runs = ActiveRuns::new();
        let tokens: Vec<CancellationToken> = (0..3).map(|_| CancellationToken::new()).collect();
        let _guards: Vec<RunGuard> = tokens
            .iter()
            .map(|t| runs.register(Uuid::new_v4(), t.clone()).unwrap())
            .collect();

        assert_eq!(runs.cancel_all().len(), 3);
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
    }
}
