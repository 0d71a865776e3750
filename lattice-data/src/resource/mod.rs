//! Resources
//!
//! A resource is a handle to one asynchronous value with read-or-suspend
//! semantics: reading it either yields the value, yields the failure, or yields
//! a [`Suspend`] handle the caller awaits before reading again.
//!
//! # Roots and derived resources
//!
//! A root resource owns a fetch. A derived resource is created from another
//! resource with [`Resource::child`], [`Resource::derive`] or
//! [`Resource::field`] and never fetches on its own; its value arrives by
//! propagation when the ancestor settles.
//!
//! Derivation is how fetches are shared. Each consumer holds its own derived
//! resource and disposes it independently. The shared fetch is aborted only
//! once every consumer has disposed.
//!
//! # Read vs. derive
//!
//! One resource instance is either read or derived from, never both. Mixing the
//! two is reported as [`crate::Error::MixedUsage`].

mod fetch;
mod handle;
mod id;
pub(crate) mod link;
mod projection;
mod state;
mod suspend;

pub use fetch::{AbortHandle, Fetch, FetchFuture};
pub use handle::Resource;
pub use id::ResourceId;
pub use projection::Key;
pub use state::{Read, Status, Suspension};
pub use suspend::Suspend;

pub(crate) use handle::Origin;
