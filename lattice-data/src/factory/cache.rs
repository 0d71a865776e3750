//! Keyed cache of master resources.

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::resource::Resource;

/// Map from cache key to the master resource for that key.
///
/// Entries are removed by the master itself when it is disposed, which happens
/// once every resource derived from it has been disposed.
pub(crate) struct Cache<T> {
    entries: Mutex<IndexMap<String, Resource<T>>>,
}

impl<T> Cache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Derive a handle from the master for `key`, creating the master with
    /// `create` on a miss.
    ///
    /// Deriving happens under the cache lock. A master that was disposed but
    /// not yet evicted is replaced rather than derived from.
    pub(crate) fn derive_or_insert_with<F>(&self, key: &str, create: F) -> Result<Resource<T>, Error>
    where
        F: FnOnce() -> Resource<T>,
    {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(master) => match master.derive_live()? {
                Some(child) => {
                    debug!(key, "cache hit");
                    return Ok(child);
                }
                None => debug!(key, "replacing disposed master"),
            },
            None => debug!(key, "cache miss"),
        }

        let master = create();
        let child = master.derive()?;
        entries.insert(key.to_owned(), master);
        Ok(child)
    }

    /// Remove `key`, but only if it still maps to `master`.
    pub(crate) fn evict(&self, key: &str, master: &Resource<T>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(current) if current.ptr_eq(master) => {
                entries.shift_remove(key);
                debug!(key, "evicted cache entry");
                true
            }
            _ => false,
        }
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
