//! Resource Implementation
//!
//! A [`Resource`] tracks one asynchronous outcome. Root resources own a fetch;
//! derived resources get their value from an ancestor by projection.
//!
//! # Lifecycle
//!
//! ```text
//!   root:     Inactive --load--> Loading --settle--> Loaded | Errored
//!                 \                 \
//!                  +---dispose------+--> Aborted
//!
//!   derived:  Loading --propagate--> Loaded | Errored
//!                 \
//!                  +---dispose--> Aborted
//! ```
//!
//! Settlement is only applied while the resource is still `Loading`, which is
//! what keeps a fetch that outlives its consumers from resolving them.
//!
//! # Sharing
//!
//! Many consumers can share one fetch: each holds its own derived resource, and
//! the parent counts how many of them are still live. The parent disposes
//! itself, and so aborts the fetch, only when that count reaches zero. The
//! last release and the disposal happen under one lock, so a resource that is
//! about to be disposed cannot gain a new dependent.
//!
//! # Locking
//!
//! Each resource guards its state with its own mutex. The lock is never held
//! while calling the fetch function, an abort handle, a projection on a
//! parent's behalf, or any other resource.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::error::{Error, FetchError};
use crate::factory::Cache;

use super::fetch::{AbortHandle, Fetch, Outcome};
use super::link::{self, Derived, Downstream, Export, Projection, Upstream};
use super::state::{Read, ReadMode, State, Status};
use super::{ResourceId, Suspend};

pub(crate) type Loader<T> = Box<dyn FnOnce() -> Fetch<T> + Send>;

/// Where a cached root came from, and how to put it into a snapshot.
pub(crate) struct Origin<T> {
    pub(crate) key: String,
    pub(crate) factory_id: Option<String>,
    pub(crate) cache: Weak<Cache<T>>,
    pub(crate) encode: fn(&T) -> serde_json::Result<serde_json::Value>,
}

pub(crate) struct Shared<T> {
    /// Identity for logs, `Debug` output and child bookkeeping.
    id: ResourceId,
    /// Placeholder handed to every pending read.
    suspend: Suspend,
    /// Mutable state. Never held across calls into other resources.
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    /// Current position in the lifecycle, holding the value or error.
    state: State<T>,
    /// Whether this instance has been read or derived from.
    read_mode: ReadMode,
    /// Set once by the first `dispose`.
    disposed: bool,
    /// The resource this one derives from. `None` for roots.
    parent: Option<Arc<dyn Upstream>>,
    /// Children waiting for this resource to settle, in registration order.
    children: SmallVec<[Box<dyn Downstream<T>>; 2]>,
    /// Children that have not been disposed yet.
    live_children: usize,
    /// The bound fetch. Taken by the first `load`.
    loader: Option<Loader<T>>,
    /// Cancels the in-flight fetch. Present only while loading.
    abort: Option<AbortHandle>,
    /// Cache bookkeeping for cached roots.
    origin: Option<Origin<T>>,
}

/// Work left to do after a resource has been marked disposed.
enum Teardown<T> {
    Derived(Arc<dyn Upstream>),
    Root {
        abort: Option<AbortHandle>,
        evict: Option<(String, Weak<Cache<T>>)>,
    },
}

impl<T> Inner<T> {
    /// Mark the resource disposed. Returns `None` if it already was.
    fn begin_dispose(&mut self) -> Option<Teardown<T>> {
        if self.disposed {
            return None;
        }
        self.disposed = true;
        self.loader = None;
        self.children.clear();
        if self.state.is_pending() {
            self.state = State::Aborted;
        }

        Some(match self.parent.clone() {
            Some(parent) => Teardown::Derived(parent),
            None => Teardown::Root {
                abort: self.abort.take(),
                evict: self
                    .origin
                    .as_ref()
                    .map(|origin| (origin.key.clone(), origin.cache.clone())),
            },
        })
    }
}

/// Handle to one asynchronous outcome.
///
/// Cloning the handle shares the same resource: reads, disposal and status are
/// all common to every clone. Use [`Resource::derive`] to get an independently
/// disposable resource that shares the same fetch.
pub struct Resource<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a root resource that will call `loader` when loaded.
    pub(crate) fn root(loader: Loader<T>, origin: Option<Origin<T>>) -> Self {
        Self::with_inner(Inner {
            state: State::Inactive,
            read_mode: ReadMode::None,
            disposed: false,
            parent: None,
            children: SmallVec::new(),
            live_children: 0,
            loader: Some(loader),
            abort: None,
            origin,
        })
    }

    fn derived(parent: Arc<dyn Upstream>) -> Self {
        Self::with_inner(Inner {
            state: State::Loading,
            read_mode: ReadMode::None,
            disposed: false,
            parent: Some(parent),
            children: SmallVec::new(),
            live_children: 0,
            loader: None,
            abort: None,
            origin: None,
        })
    }

    fn with_inner(inner: Inner<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: ResourceId::next(),
                suspend: Suspend::new(),
                inner: Mutex::new(inner),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    /// Start fetching.
    ///
    /// Derived resources forward the call to their root. On a root this is a
    /// no-op unless the resource is still `Inactive`. A fetch that comes back
    /// already settled is applied before `load` returns; otherwise the future
    /// is spawned on the current tokio runtime. Without a runtime to drive it,
    /// the resource errors instead.
    ///
    /// # Panics
    ///
    /// Panics raised by the fetch function are not caught.
    pub fn load(&self) {
        let loader = {
            let mut inner = self.shared.inner.lock();
            if inner.disposed {
                return;
            }
            let parent = inner.parent.clone();
            if let Some(parent) = parent {
                drop(inner);
                parent.load();
                return;
            }
            if !matches!(inner.state, State::Inactive) {
                return;
            }
            match inner.loader.take() {
                Some(loader) => loader,
                None => return,
            }
        };

        debug!(resource = %self.id(), "starting fetch");
        let Fetch { outcome, abort } = loader();

        {
            let mut inner = self.shared.inner.lock();
            if !matches!(inner.state, State::Inactive) {
                // Disposed while the fetch function ran.
                drop(inner);
                if let Some(abort) = abort {
                    abort.abort();
                }
                return;
            }
            inner.state = State::Loading;
            inner.abort = abort;
        }

        match outcome {
            Outcome::Ready(result) => self.settle(result),
            Outcome::Pending(fut) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let this = self.clone();
                    runtime.spawn(async move {
                        let result = fut.await;
                        this.settle(result);
                    });
                }
                Err(err) => {
                    warn!(resource = %self.id(), error = %err, "no runtime to drive fetch");
                    self.settle(Err(FetchError::new(err)));
                }
            },
        }
    }

    /// Read the value, or learn why it is not available.
    ///
    /// Returns [`Error::MixedUsage`] if this resource was already used to
    /// derive children.
    pub fn read(&self) -> Result<Read<T>, Error> {
        let mut inner = self.shared.inner.lock();
        inner.read_mode.enter(ReadMode::Read)?;

        Ok(match &inner.state {
            State::Loaded(value) => Read::Ready(value.clone()),
            State::Errored(err) => Read::Failed(err.clone()),
            _ => Read::Pending(self.shared.suspend.clone()),
        })
    }

    /// Dispose of the resource. Calling this more than once has no effect.
    ///
    /// A derived resource tells its parent one dependent has gone. A root
    /// resource that is still pending becomes `Aborted` and fires its abort
    /// handle; a cached root also drops its cache entry, whatever its status.
    pub fn dispose(&self) {
        let teardown = self.shared.inner.lock().begin_dispose();
        if let Some(teardown) = teardown {
            self.finish_dispose(teardown);
        }
    }

    fn finish_dispose(&self, teardown: Teardown<T>) {
        match teardown {
            Teardown::Derived(parent) => {
                trace!(resource = %self.id(), "disposed derived resource");
                parent.release(self.id());
            }
            Teardown::Root { abort, evict } => {
                if let Some(abort) = abort {
                    debug!(resource = %self.id(), "aborting fetch");
                    abort.abort();
                }
                if let Some((key, cache)) = evict {
                    if let Some(cache) = cache.upgrade() {
                        cache.evict(&key, self);
                    }
                }
            }
        }
    }

    /// Derive a child whose value is `project` applied to this resource's
    /// value.
    ///
    /// If this resource has already settled the child settles immediately;
    /// otherwise it settles when this one does. Projection errors land in the
    /// child only. The child counts as a live dependent until it is disposed.
    ///
    /// Returns [`Error::MixedUsage`] if this resource was already read.
    pub fn child<U, F>(&self, project: F) -> Result<Resource<U>, Error>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> Result<U, FetchError> + Send + Sync + 'static,
    {
        let child = Resource::<U>::derived(link::upstream(self));
        self.attach(&child, Box::new(project), false)?;
        Ok(child)
    }

    /// Derive a child with the same value as this resource.
    ///
    /// This is how cached resources are handed out: every caller gets its own
    /// disposable handle onto the one shared fetch.
    pub fn derive(&self) -> Result<Resource<T>, Error> {
        self.child(|value: &T| Ok(value.clone()))
    }

    /// Like [`Resource::derive`], but `None` once this resource is disposed.
    pub(crate) fn derive_live(&self) -> Result<Option<Resource<T>>, Error> {
        let child = Resource::derived(link::upstream(self));
        let attached = self.attach(&child, Box::new(|value: &T| Ok(value.clone())), true)?;
        Ok(attached.then_some(child))
    }

    /// Register `child` as a dependent. Returns `false`, leaving this resource
    /// untouched, if `live_only` is set and it is already disposed.
    fn attach<U>(
        &self,
        child: &Resource<U>,
        project: Projection<T, U>,
        live_only: bool,
    ) -> Result<bool, Error>
    where
        U: Clone + Send + Sync + 'static,
    {
        let mut project = Some(project);

        let settled = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            if live_only && inner.disposed {
                return Ok(false);
            }
            inner.read_mode.enter(ReadMode::Child)?;
            inner.live_children += 1;

            let settled = match &inner.state {
                State::Loaded(value) => Some(Ok(value.clone())),
                State::Errored(err) => Some(Err(err.clone())),
                _ => None,
            };
            if inner.state.is_pending() {
                if let Some(project) = project.take() {
                    inner.children.push(Box::new(Derived {
                        id: child.id(),
                        child: Arc::downgrade(&child.shared),
                        project,
                    }));
                }
            }
            settled
        };

        match (settled, project) {
            (Some(Ok(value)), Some(project)) => child.settle(project(&value)),
            (Some(Err(err)), _) => child.settle(Err(err)),
            _ => {}
        }
        Ok(true)
    }

    /// Resolve an inactive root without fetching. Used for hydration.
    pub(crate) fn resolve_now(&self, value: T) -> bool {
        {
            let mut inner = self.shared.inner.lock();
            if !matches!(inner.state, State::Inactive) {
                return false;
            }
            inner.state = State::Loaded(value);
            inner.loader = None;
        }
        self.shared.suspend.release();
        true
    }

    pub(crate) fn settle(&self, result: Result<T, FetchError>) {
        let children = {
            let mut inner = self.shared.inner.lock();
            if !matches!(inner.state, State::Loading) {
                trace!(resource = %self.id(), "ignoring late settlement");
                return;
            }
            inner.abort = None;
            inner.state = match &result {
                Ok(value) => State::Loaded(value.clone()),
                Err(err) => State::Errored(err.clone()),
            };
            std::mem::take(&mut inner.children)
        };

        trace!(
            resource = %self.id(),
            ok = result.is_ok(),
            children = children.len(),
            "settled"
        );
        match &result {
            Ok(value) => children.iter().for_each(|child| child.resolve(value)),
            Err(err) => children.iter().for_each(|child| child.reject(err)),
        }
        self.shared.suspend.release();
    }

    /// The dependent `child` was disposed. Disposes this resource too when it
    /// was the last one.
    pub(crate) fn release(&self, child: ResourceId) {
        let teardown = {
            let mut inner = self.shared.inner.lock();
            inner.children.retain(|entry| entry.child_id() != child);
            inner.live_children = inner.live_children.saturating_sub(1);
            if inner.live_children == 0 {
                inner.begin_dispose()
            } else {
                None
            }
        };

        if let Some(teardown) = teardown {
            self.finish_dispose(teardown);
        }
    }

    /// The root's loaded value, keyed for the server snapshot.
    pub(crate) fn export(&self) -> Option<Result<Export, Error>> {
        let inner = self.shared.inner.lock();
        let parent = inner.parent.clone();
        if let Some(parent) = parent {
            drop(inner);
            return parent.export();
        }

        let origin = inner.origin.as_ref()?;
        let id = origin.factory_id.clone()?;
        let State::Loaded(value) = &inner.state else {
            return None;
        };

        Some(
            (origin.encode)(value)
                .map(|value| Export {
                    id,
                    key: origin.key.clone(),
                    value,
                })
                .map_err(Error::from),
        )
    }
}

impl<T> Resource<T> {
    /// Unique id of this resource.
    pub fn id(&self) -> ResourceId {
        self.shared.id
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.shared.inner.lock().state.status()
    }

    /// Not loaded and not errored: inactive, loading or aborted.
    pub fn is_loading(&self) -> bool {
        matches!(
            self.status(),
            Status::Inactive | Status::Loading | Status::Aborted
        )
    }

    /// Whether the value is available.
    pub fn is_loaded(&self) -> bool {
        self.status() == Status::Loaded
    }

    /// Whether the fetch, or a projection above this resource, failed.
    pub fn is_errored(&self) -> bool {
        self.status() == Status::Errored
    }

    /// Whether `dispose` has run, directly or through the last dependent.
    pub fn is_disposed(&self) -> bool {
        self.shared.inner.lock().disposed
    }

    /// Whether this resource owns its fetch rather than deriving from a parent.
    pub fn is_root(&self) -> bool {
        self.shared.inner.lock().parent.is_none()
    }

    /// The cache key, for cached roots.
    pub fn cache_key(&self) -> Option<String> {
        let inner = self.shared.inner.lock();
        inner.origin.as_ref().map(|origin| origin.key.clone())
    }

    /// Number of derived resources that have not been disposed yet.
    pub fn live_children(&self) -> usize {
        self.shared.inner.lock().live_children
    }

    /// Whether both handles point at the same resource.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Resource")
            .field("id", &self.shared.id)
            .field("status", &inner.state.status())
            .field("root", &inner.parent.is_none())
            .field("live_children", &inner.live_children)
            .field("disposed", &inner.disposed)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
