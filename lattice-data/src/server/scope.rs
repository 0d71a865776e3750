//! Render Context
//!
//! A [`RenderContext`] scopes one server render. It holds a fresh cache per
//! factory id, so concurrent renders never see each other's data, and records
//! the values that were actually rendered into the extractor's snapshot.
//!
//! # Current scope
//!
//! Render-time code reaches the context through [`RenderContext::current`].
//! A thread-local stack tracks the entered contexts; [`RenderContext::enter`]
//! pushes one and the returned guard pops it again. Nested scopes are allowed.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::Error;
use crate::factory::Cache;
use crate::resource::link::Export;
use crate::resource::{Read, Resource};
use crate::snapshot::CacheData;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<RenderContext>> = const { RefCell::new(Vec::new()) };
}

/// Per-render cache scope. Cloning shares the same scope.
#[derive(Clone)]
pub struct RenderContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    /// Factory id → `Cache<T>` for that factory's value type.
    caches: DashMap<String, Arc<dyn Any + Send + Sync>>,
    snapshot: Arc<Mutex<CacheData>>,
}

impl RenderContext {
    pub(crate) fn new(snapshot: Arc<Mutex<CacheData>>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                caches: DashMap::new(),
                snapshot,
            }),
        }
    }

    /// Make this the current context on this thread until the guard drops.
    pub fn enter(&self) -> ScopeGuard {
        SCOPE_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        ScopeGuard {
            context: self.clone(),
        }
    }

    /// The innermost entered context on this thread.
    pub fn current() -> Option<RenderContext> {
        SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Whether both handles refer to the same render.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Record the root value behind `resource` in the snapshot.
    ///
    /// Does nothing unless `will_render` is set, the resource comes from a
    /// factory with an id, and its root has loaded.
    pub fn register<T>(&self, resource: &Resource<T>, will_render: bool) -> Result<(), Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !will_render {
            return Ok(());
        }
        let Some(export) = resource.export() else {
            return Ok(());
        };
        let Export { id, key, value } = export?;

        trace!(id = %id, key = %key, "registered rendered value");
        self.inner
            .snapshot
            .lock()
            .entry(id)
            .or_default()
            .insert(key, value);
        Ok(())
    }

    /// Read `resource`, registering its value when it is ready to render.
    pub fn render<T>(&self, resource: &Resource<T>) -> Result<Read<T>, Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        let read = resource.read()?;
        if read.is_ready() {
            self.register(resource, true)?;
        }
        Ok(read)
    }

    /// This render's cache for the factory `id`.
    pub(crate) fn cache_for<T>(&self, id: &str) -> Result<Arc<Cache<T>>, Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = self
            .inner
            .caches
            .entry(id.to_owned())
            .or_insert_with(|| {
                let cache: Arc<dyn Any + Send + Sync> = Arc::new(Cache::<T>::new());
                cache
            })
            .clone();

        entry
            .downcast::<Cache<T>>()
            .map_err(|_| Error::CacheTypeMismatch(id.to_owned()))
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("factories", &self.inner.caches.len())
            .finish()
    }
}

/// Pops the entered [`RenderContext`] when dropped.
pub struct ScopeGuard {
    context: RenderContext,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(popped) = popped {
                debug_assert!(
                    popped.ptr_eq(&self.context),
                    "RenderContext scopes exited out of order"
                );
            }
        });
    }
}
