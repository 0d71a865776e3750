//! Client Hydration
//!
//! Server-rendered data arrives on the client through a [`Globals`] handle.
//! The host installs the snapshot (from the data script or any other
//! transport), then passes the handle to its factories with
//! [`crate::FactoryOptions::globals`]. Use [`Globals::preload`] to wait for a
//! snapshot that is installed asynchronously.

mod globals;

pub use globals::Globals;
