use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

/// Tracks cache keys that currently have a background refresh running.
#[derive(Default, Clone)]
pub struct InFlightRefreshes {
    keys: Arc<DashMap<String, ()>>,
}

#[derive(Debug, Error)]
pub enum InFlightError {
    #[error("refresh already in progress for `{key}`")]
    AlreadyRunning { key: String },
}

impl InFlightRefreshes {
    pub fn new() -> Self {
        Self {
            keys: Arc::new(DashMap::new()),
        }
    }

    pub fn acquire(&self, key: &str) -> Result<RefreshGuard, InFlightError> {
        use dashmap::mapref::entry::Entry;

        match self.keys.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(RefreshGuard {
                    key: key.to_string(),
                    keys: Arc::clone(&self.keys),
                })
            }
            Entry::Occupied(_) => Err(InFlightError::AlreadyRunning {
                key: key.to_string(),
            }),
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }
}

/// Releases the key when dropped, whether the refresh succeeded or not.
pub struct RefreshGuard {
    key: String,
    keys: Arc<DashMap<String, ()>>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}
