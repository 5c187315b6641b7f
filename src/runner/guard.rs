use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum RunKey {
    Backup(Uuid),
    AdHoc(Uuid),
}

/// Live runs keyed by job, each with the token that cancels it.
#[derive(Clone, Default)]
pub(super) struct RunRegistry {
    runs: Arc<Mutex<HashMap<RunKey, CancellationToken>>>,
}

impl RunRegistry {
    /// Atomically claims `key`. Returns None if it is already held.
    pub(super) fn claim(&self, key: RunKey, token: CancellationToken) -> Option<RunningGuard> {
        let mut runs = self.runs.lock().ok()?;
        if runs.contains_key(&key) {
            return None;
        }
        runs.insert(key, token);
        Some(RunningGuard {
            runs: Arc::clone(&self.runs),
            key,
        })
    }

    pub(super) fn contains(&self, key: RunKey) -> bool {
        self.runs
            .lock()
            .map(|runs| runs.contains_key(&key))
            .unwrap_or(false)
    }

    pub(super) fn len(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or(0)
    }

    pub(super) fn cancel_all(&self) -> usize {
        match self.runs.lock() {
            Ok(runs) => {
                for token in runs.values() {
                    token.cancel();
                }
                runs.len()
            }
            Err(_) => 0,
        }
    }
}

/// Releases its key when dropped.
pub(super) struct RunningGuard {
    runs: Arc<Mutex<HashMap<RunKey, CancellationToken>>>,
    key: RunKey,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.remove(&self.key);
        }
    }
}
