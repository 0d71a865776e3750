//! Resource Factory
//!
//! A [`ResourceFactory`] binds a fetch function to requests and hands out
//! [`Resource`]s for them.
//!
//! # Caching
//!
//! Without a serializer every call gets an independent root resource. With
//! one, each request is turned into a cache key and all callers asking for the
//! same key share one master resource: each receives its own
//! [`Resource::derive`]d handle, so the fetch runs once and is aborted only
//! after every caller has disposed.
//!
//! Client factories keep their cache on the factory. Server factories keep it
//! on the current [`RenderContext`], since a factory is typically a static
//! shared by concurrent renders.
//!
//! # Hydration
//!
//! A client factory with an `id` and a [`crate::Globals`] handle looks for
//! server-rendered values before fetching. A value found there resolves the new
//! master immediately and is removed from the global cache.

mod cache;
mod hook;
mod options;

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Error;
use crate::resource::{Fetch, Origin, Resource};
use crate::server::RenderContext;

pub(crate) use cache::Cache;
pub use hook::ResourceHook;
pub use options::{Environment, FactoryOptions, Serialization, DEFAULT_CACHE_VAR};

use options::Config;

type FetchFn<Req, T> = Arc<dyn Fn(&Req) -> Fetch<T> + Send + Sync>;

/// Creates and deduplicates resources for one fetch function.
///
/// Cloning a factory shares its cache.
pub struct ResourceFactory<Req, T> {
    inner: Arc<FactoryInner<Req, T>>,
}

struct FactoryInner<Req, T> {
    fetch: FetchFn<Req, T>,
    config: Config<Req>,
    /// Client-side cache. `None` when caching is off or on the server.
    cache: Option<Arc<Cache<T>>>,
    /// Caching on the server needs a render context to hold the cache.
    need_context: bool,
}

impl<Req, T> Clone for ResourceFactory<Req, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Req, T> ResourceFactory<Req, T>
where
    Req: Serialize + PartialEq + Clone + Send + Sync + 'static,
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a factory, validating `options`.
    pub fn new<F>(fetch: F, options: FactoryOptions<Req>) -> Result<Self, Error>
    where
        F: Fn(&Req) -> Fetch<T> + Send + Sync + 'static,
    {
        let config = options.validate()?;
        let caching = config.serialize.is_some();
        let (cache, need_context) = match config.environment {
            Environment::Client => (caching.then(|| Arc::new(Cache::new())), false),
            Environment::Server => (None, caching),
        };

        debug!(
            id = config.id.as_deref().unwrap_or("-"),
            environment = ?config.environment,
            caching,
            "created resource factory"
        );

        Ok(Self {
            inner: Arc::new(FactoryInner {
                fetch: Arc::new(fetch),
                config,
                cache,
                need_context,
            }),
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.inner.config.id.as_deref()
    }

    pub fn environment(&self) -> Environment {
        self.inner.config.environment
    }

    /// Get a resource for `req` and start loading it. The caller owns the
    /// returned resource and must dispose it.
    ///
    /// Returns [`Error::CreateNeedsContext`] for a caching server factory; use
    /// [`ResourceFactory::create_in`] there.
    pub fn create(&self, req: Req) -> Result<Resource<T>, Error> {
        if self.inner.need_context {
            return Err(Error::CreateNeedsContext);
        }
        self.create_with(&req, None)
    }

    /// Like [`ResourceFactory::create`], caching in `ctx` on the server.
    pub fn create_in(&self, ctx: &RenderContext, req: Req) -> Result<Resource<T>, Error> {
        self.create_with(&req, Some(ctx))
    }

    /// Render-time entry point.
    ///
    /// On the server this behaves like `create` within the current
    /// [`RenderContext`] scope. With `no_ssr` the resource is never loaded
    /// there and stays pending.
    ///
    /// On the client the hook's resource is returned as long as the request
    /// (or its cache key) is unchanged. Loading is deferred to
    /// [`ResourceHook::commit`].
    pub fn use_resource(
        &self,
        hook: &mut ResourceHook<Req, T>,
        req: Req,
    ) -> Result<Resource<T>, Error> {
        if self.inner.config.environment == Environment::Server {
            let ctx = RenderContext::current();
            if self.inner.need_context && ctx.is_none() {
                return Err(Error::MissingRenderContext);
            }
            return self.create_with(&req, ctx.as_ref());
        }

        if let Some(resource) = hook.current_for(&req) {
            return Ok(resource);
        }

        let (resource, key) = {
            let previous = hook.key().zip(hook.resource());
            self.get_resource(&req, previous, None)?
        };
        hook.set(req, key, resource.clone());
        Ok(resource)
    }

    /// Whether the client cache currently holds a master for `req`.
    pub fn has_cache_entry(&self, req: &Req) -> Result<bool, Error> {
        let (Some(cache), Some(serialize)) = (&self.inner.cache, &self.inner.config.serialize)
        else {
            return Ok(false);
        };
        Ok(cache.contains_key(&serialize.key(req)?))
    }

    /// Number of masters in the client cache.
    pub fn cache_len(&self) -> usize {
        self.inner.cache.as_ref().map_or(0, |cache| cache.len())
    }

    fn create_with(&self, req: &Req, ctx: Option<&RenderContext>) -> Result<Resource<T>, Error> {
        let (resource, _) = self.get_resource(req, None, ctx)?;
        if !self.inner.config.no_ssr {
            resource.load();
        }
        Ok(resource)
    }

    /// Resolve `req` to a resource and its cache key.
    fn get_resource(
        &self,
        req: &Req,
        previous: Option<(&str, &Resource<T>)>,
        ctx: Option<&RenderContext>,
    ) -> Result<(Resource<T>, Option<String>), Error> {
        let config = &self.inner.config;
        let Some(serialize) = &config.serialize else {
            return Ok((self.root(req, None), None));
        };

        let key = serialize.key(req)?;
        if let Some((previous_key, previous)) = previous {
            if previous_key == key {
                return Ok((previous.clone(), Some(key)));
            }
        }

        let cache = match (&self.inner.cache, ctx) {
            (Some(cache), _) => Arc::clone(cache),
            (None, Some(ctx)) => {
                let id = config.id.as_deref().ok_or(Error::MissingId)?;
                ctx.cache_for::<T>(id)?
            }
            (None, None) => return Err(Error::MissingRenderContext),
        };

        let resource = cache.derive_or_insert_with(&key, || {
            let origin = Origin {
                key: key.clone(),
                factory_id: config.id.clone(),
                cache: Arc::downgrade(&cache),
                encode: |value: &T| serde_json::to_value(value),
            };
            let master = self.root(req, Some(origin));
            self.populate_from_global(&master, &key);
            master
        })?;

        Ok((resource, Some(key)))
    }

    fn root(&self, req: &Req, origin: Option<Origin<T>>) -> Resource<T> {
        let fetch = Arc::clone(&self.inner.fetch);
        let req = req.clone();
        Resource::root(Box::new(move || fetch(&req)), origin)
    }

    /// Seed a new master from the global cache, if a server value exists.
    fn populate_from_global(&self, master: &Resource<T>, key: &str) {
        let config = &self.inner.config;
        if config.environment != Environment::Client {
            return;
        }
        let (Some(id), Some(globals)) = (&config.id, &config.globals) else {
            return;
        };
        let Some(value) = globals.take(&config.cache_var, id, key) else {
            return;
        };

        match serde_json::from_value::<T>(value) {
            Ok(value) => {
                debug!(id = %id, key, "hydrated from global cache");
                master.resolve_now(value);
            }
            Err(err) => {
                warn!(id = %id, key, error = %err, "undecodable global cache entry, fetching instead");
            }
        }
    }
}

impl<Req, T> fmt::Debug for ResourceFactory<Req, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = &self.inner.config;
        f.debug_struct("ResourceFactory")
            .field("id", &config.id)
            .field("environment", &config.environment)
            .field("caching", &config.serialize.is_some())
            .field("no_ssr", &config.no_ssr)
            .finish()
    }
}
