//! Factory Options
//!
//! [`FactoryOptions`] is what callers build; [`Config`] is what a factory
//! keeps after validation. Every misconfiguration is reported from
//! [`crate::ResourceFactory::new`] rather than on first use.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::client::Globals;
use crate::error::Error;

/// Name of the global cache slot used when none is configured.
pub const DEFAULT_CACHE_VAR: &str = "__lattice-data.DATA_CACHE";

/// Where a factory runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Persistent environment with mount/unmount effects. Caches live on the
    /// factory and may be seeded from the global cache.
    #[default]
    Client,

    /// Render-only pass. Caches live on the current [`crate::RenderContext`]
    /// so concurrent renders never share data.
    Server,
}

/// How requests are turned into cache keys.
pub enum Serialization<Req> {
    /// No caching; every request gets its own fetch.
    Disabled,

    /// Key is the request's JSON encoding.
    Json,

    /// Key is produced by a custom function.
    With(Arc<dyn Fn(&Req) -> String + Send + Sync>),
}

impl<Req> Serialization<Req> {
    /// Custom key function.
    pub fn with<F>(serialize: F) -> Self
    where
        F: Fn(&Req) -> String + Send + Sync + 'static,
    {
        Self::With(Arc::new(serialize))
    }
}

impl<Req> Clone for Serialization<Req> {
    fn clone(&self) -> Self {
        match self {
            Self::Disabled => Self::Disabled,
            Self::Json => Self::Json,
            Self::With(serialize) => Self::With(Arc::clone(serialize)),
        }
    }
}

impl<Req> fmt::Debug for Serialization<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Json => f.write_str("Json"),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

impl<Req> From<bool> for Serialization<Req> {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Json
        } else {
            Self::Disabled
        }
    }
}

/// Options accepted by [`crate::ResourceFactory::new`].
///
/// ```rust,ignore
/// let options = FactoryOptions::new()
///     .id("users")
///     .environment(Environment::Server);
/// ```
pub struct FactoryOptions<Req> {
    id: Option<String>,
    serialize: Option<Serialization<Req>>,
    no_ssr: bool,
    cache_var: Option<String>,
    environment: Environment,
    globals: Option<Globals>,
}

impl<Req> Default for FactoryOptions<Req> {
    fn default() -> Self {
        Self {
            id: None,
            serialize: None,
            no_ssr: false,
            cache_var: None,
            environment: Environment::default(),
            globals: None,
        }
    }
}

impl<Req> FactoryOptions<Req> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable id that lets server-rendered values reach this factory on the
    /// client. Implies JSON serialization unless another is given.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Enable (`true`), disable (`false`) or customise request caching.
    pub fn serialize(mut self, serialize: impl Into<Serialization<Req>>) -> Self {
        self.serialize = Some(serialize.into());
        self
    }

    /// Shorthand for `serialize(Serialization::with(f))`.
    pub fn serialize_with<F>(self, serialize: F) -> Self
    where
        F: Fn(&Req) -> String + Send + Sync + 'static,
    {
        self.serialize(Serialization::with(serialize))
    }

    /// Skip fetching during server rendering; the fetch happens once the
    /// component mounts on the client. Ignored on the client.
    pub fn no_ssr(mut self, no_ssr: bool) -> Self {
        self.no_ssr = no_ssr;
        self
    }

    pub fn cache_var(mut self, cache_var: impl Into<String>) -> Self {
        self.cache_var = Some(cache_var.into());
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Global cache to hydrate from.
    pub fn globals(mut self, globals: Globals) -> Self {
        self.globals = Some(globals);
        self
    }

    pub(crate) fn validate(self) -> Result<Config<Req>, Error> {
        if matches!(&self.id, Some(id) if id.is_empty()) {
            return Err(Error::EmptyId);
        }

        let serialize = match (self.id.is_some(), self.serialize) {
            (true, Some(Serialization::Disabled)) => return Err(Error::SerializationDisabled),
            (true, None) => Some(KeyFn::Json),
            (false, None) | (false, Some(Serialization::Disabled)) => None,
            (_, Some(Serialization::Json)) => Some(KeyFn::Json),
            (_, Some(Serialization::With(serialize))) => Some(KeyFn::With(serialize)),
        };

        let cache_var = match self.cache_var {
            Some(cache_var) if cache_var.is_empty() => return Err(Error::EmptyCacheVar),
            Some(cache_var) => cache_var,
            None => DEFAULT_CACHE_VAR.to_owned(),
        };

        if self.environment == Environment::Server && serialize.is_some() && self.id.is_none() {
            return Err(Error::MissingId);
        }

        Ok(Config {
            id: self.id,
            serialize,
            no_ssr: self.no_ssr && self.environment == Environment::Server,
            cache_var,
            environment: self.environment,
            globals: self.globals,
        })
    }
}

/// Validated key function.
pub(crate) enum KeyFn<Req> {
    Json,
    With(Arc<dyn Fn(&Req) -> String + Send + Sync>),
}

impl<Req> KeyFn<Req>
where
    Req: Serialize,
{
    pub(crate) fn key(&self, req: &Req) -> Result<String, Error> {
        match self {
            Self::Json => Ok(serde_json::to_string(req)?),
            Self::With(serialize) => Ok(serialize(req)),
        }
    }
}

pub(crate) struct Config<Req> {
    pub(crate) id: Option<String>,
    pub(crate) serialize: Option<KeyFn<Req>>,
    pub(crate) no_ssr: bool,
    pub(crate) cache_var: String,
    pub(crate) environment: Environment,
    pub(crate) globals: Option<Globals>,
}
