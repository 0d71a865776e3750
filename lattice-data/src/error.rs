//! Error Types
//!
//! Two kinds of failure flow through this crate and they are kept apart:
//!
//! - [`Error`] is a contract violation. It is returned synchronously from the
//!   call that broke the contract (bad factory options, reading a resource
//!   that was already used for derivation, a server render without a
//!   collector) and is never deferred into the async path.
//!
//! - [`FetchError`] is the outcome of a fetch that failed. It is stored in the
//!   resource and handed out through [`crate::Read::Failed`], the same channel
//!   a successful value travels through. It is cheap to clone because every
//!   child derived from the failed resource receives the same error.

use std::fmt;
use std::sync::Arc;

/// Synchronous usage and configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("options.id must be a non-empty string if provided")]
    EmptyId,

    #[error("options.cache_var must be a non-empty string if provided")]
    EmptyCacheVar,

    #[error("serialization cannot be disabled when using global cache")]
    SerializationDisabled,

    #[error("if using caching on server side, must also provide options.id")]
    MissingId,

    #[error("`create` cannot be used on server side with caching enabled, use `create_in`")]
    CreateNeedsContext,

    #[error("application must be rendered inside a `RenderContext` when using caching on server side")]
    MissingRenderContext,

    #[error("cannot call both `read` and `child` on a resource")]
    MixedUsage,

    #[error("factory id `{0}` was used with more than one value type in the same render")]
    CacheTypeMismatch(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("global cache was dropped before data arrived")]
    BridgeClosed,
}

/// Failure outcome of a fetch, shared by every consumer of that fetch.
#[derive(Clone, thiserror::Error)]
pub enum FetchError {
    /// The fetch future completed with an error.
    #[error("fetch failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync>),

    /// A child projection could not be applied to the parent's value.
    #[error("projection failed: {0}")]
    Projection(Arc<str>),
}

impl FetchError {
    /// Wrap any error as a fetch failure.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(Arc::new(err))
    }

    /// Build a fetch failure from a plain message.
    pub fn msg(msg: impl fmt::Display) -> Self {
        Self::Failed(Arc::new(Message(msg.to_string())))
    }

    /// Build a projection failure.
    pub fn projection(reason: impl fmt::Display) -> Self {
        Self::Projection(Arc::from(reason.to_string()))
    }

    /// Whether two errors are the very same failure instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Failed(a), Self::Failed(b)) => Arc::ptr_eq(a, b),
            (Self::Projection(a), Self::Projection(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => f.debug_tuple("Failed").field(&err.to_string()).finish(),
            Self::Projection(reason) => f.debug_tuple("Projection").field(reason).finish(),
        }
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}
