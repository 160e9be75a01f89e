//! Per-character write serialization.
//!
//! Every read-modify-write on a character's balances runs inside
//! [`CharacterLocks::with_lock`], so two concurrent spends cannot both pass
//! the balance check. Services that share a store must share one
//! `CharacterLocks` (it is cheap to clone).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::growth::errors::GrowthError;

#[derive(Clone, Default)]
pub struct CharacterLocks {
    slots: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CharacterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<R, F>(&self, key: &str, f: F) -> Result<R, GrowthError>
    where
        F: FnOnce() -> Result<R, GrowthError>,
    {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|_| GrowthError::Internal("character lock table poisoned".into()))?;
            slots.entry(key.to_string()).or_default().clone()
        };

        let result = {
            // The guarded value is (), so a poisoned slot carries no broken state.
            let _guard = slot.lock().unwrap_or_else(|poison| poison.into_inner());
            f()
        };

        if let Ok(mut slots) = self.slots.lock() {
            // Table + our clone; nobody else can be waiting on this slot.
            if Arc::strong_count(&slot) == 2 {
                slots.remove(key);
            }
        }
        result
    }

    /// Number of keys with a live lock slot.
    pub fn active(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}
