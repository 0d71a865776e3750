//! Lattice Data
//!
//! Suspending data resources for Lattice components. A component asks a
//! [`ResourceFactory`] for the data behind a request and reads the returned
//! [`Resource`]: it gets the value, the failure, or a [`Suspend`] handle to
//! await before rendering again.
//!
//! The crate provides:
//!
//! - Resources with explicit disposal and cooperative cancellation
//! - Request de-duplication through keyed caches of shared fetches
//! - Child resources that project a parent's value without refetching
//! - Server-side collection of rendered values and client-side hydration
//!
//! # Architecture
//!
//! - `resource`: the resource state machine and its parent/child links
//! - `factory`: request keys, caches and the per-call-site hook
//! - `server`: per-render contexts and the data extractor
//! - `client`: the global cache handed from server to client
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_data::{Fetch, FactoryOptions, Read, ResourceFactory};
//!
//! let users = ResourceFactory::new(
//!     |id: &u32| Fetch::new(fetch_user(*id)),
//!     FactoryOptions::new().id("users"),
//! )?;
//!
//! let user = users.create(7)?;
//! match user.read()? {
//!     Read::Ready(user) => render(user),
//!     Read::Pending(suspend) => suspend.await,
//!     Read::Failed(err) => render_error(err),
//! }
//! user.dispose();
//! ```

pub mod client;
pub mod error;
pub mod factory;
pub mod resource;
pub mod server;
pub mod snapshot;

pub use client::Globals;
pub use error::{Error, FetchError};
pub use factory::{
    Environment, FactoryOptions, ResourceFactory, ResourceHook, Serialization, DEFAULT_CACHE_VAR,
};
pub use resource::{
    AbortHandle, Fetch, FetchFuture, Key, Read, Resource, ResourceId, Status, Suspend, Suspension,
};
pub use server::{DataExtractor, ExtractorOptions, RenderContext, ScopeGuard};
pub use snapshot::{jsonify, CacheData};
