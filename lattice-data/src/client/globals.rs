//! Global Cache
//!
//! [`Globals`] is the handoff point between a server snapshot and client
//! factories. Each named slot holds one snapshot. Factories consume entries
//! from it as they hydrate; an entry is handed out at most once, so a later
//! request for the same data fetches fresh.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Error;
use crate::snapshot::CacheData;

enum Slot {
    /// `preload` was called before any data was installed.
    Waiting(Vec<oneshot::Sender<CacheData>>),
    Ready(CacheData),
}

/// Named global cache slots, shared by every clone of the handle.
#[derive(Clone, Default)]
pub struct Globals {
    slots: Arc<DashMap<String, Slot>>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a snapshot under `cache_var`, waking pending `preload` calls.
    pub fn install(&self, cache_var: &str, data: CacheData) {
        let waiters = {
            let mut slot = self
                .slots
                .entry(cache_var.to_owned())
                .or_insert_with(|| Slot::Waiting(Vec::new()));
            match std::mem::replace(slot.value_mut(), Slot::Ready(data.clone())) {
                Slot::Waiting(waiters) => waiters,
                Slot::Ready(_) => Vec::new(),
            }
        };

        debug!(
            cache_var,
            factories = data.len(),
            waiters = waiters.len(),
            "installed global cache data"
        );
        for waiter in waiters {
            // A dropped preload future is not an error.
            let _ = waiter.send(data.clone());
        }
    }

    /// Install a snapshot given as JSON (`{"id": {"key": value}}`).
    pub fn install_json(&self, cache_var: &str, data: Value) -> Result<(), Error> {
        let data: CacheData = serde_json::from_value(data)?;
        self.install(cache_var, data);
        Ok(())
    }

    /// Wait until data is installed under `cache_var`.
    ///
    /// Resolves immediately if it already is. Fails with
    /// [`Error::BridgeClosed`] if the slot is cleared first.
    pub async fn preload(&self, cache_var: &str) -> Result<CacheData, Error> {
        if cache_var.is_empty() {
            return Err(Error::EmptyCacheVar);
        }

        let rx = {
            let mut slot = self
                .slots
                .entry(cache_var.to_owned())
                .or_insert_with(|| Slot::Waiting(Vec::new()));
            match slot.value_mut() {
                Slot::Ready(data) => return Ok(data.clone()),
                Slot::Waiting(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            }
        };

        rx.await.map_err(|_| Error::BridgeClosed)
    }

    /// Remaining data under `cache_var`.
    pub fn data(&self, cache_var: &str) -> Option<CacheData> {
        match self.slots.get(cache_var)?.value() {
            Slot::Ready(data) => Some(data.clone()),
            Slot::Waiting(_) => None,
        }
    }

    /// Whether every installed entry under `cache_var` has been consumed.
    pub fn is_drained(&self, cache_var: &str) -> bool {
        self.slots
            .get(cache_var)
            .map_or(true, |slot| match slot.value() {
                Slot::Ready(data) => data.is_empty(),
                Slot::Waiting(_) => true,
            })
    }

    /// Drop the slot. Pending `preload` calls fail.
    pub fn clear(&self, cache_var: &str) {
        self.slots.remove(cache_var);
    }

    /// Remove and return `[cache_var][id][key]`. A factory's map is removed
    /// once its last entry is taken.
    pub(crate) fn take(&self, cache_var: &str, id: &str, key: &str) -> Option<Value> {
        let mut slot = self.slots.get_mut(cache_var)?;
        let Slot::Ready(data) = slot.value_mut() else {
            return None;
        };

        let values = data.get_mut(id)?;
        let value = values.shift_remove(key)?;
        if values.is_empty() {
            data.shift_remove(id);
        }
        Some(value)
    }
}

impl fmt::Debug for Globals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Globals")
            .field("slots", &self.slots.len())
            .finish()
    }
}
