//! Server Rendering
//!
//! A [`DataExtractor`] is created per page. Each render gets a
//! [`RenderContext`] from [`DataExtractor::collect_data`]; caching factories
//! keep their per-request cache there, and values that are rendered are
//! registered into the extractor's snapshot. After rendering,
//! [`DataExtractor::script`] produces the markup that hands the snapshot to
//! the client.

mod extractor;
mod scope;

pub use extractor::{DataExtractor, ExtractorOptions};
pub use scope::{RenderContext, ScopeGuard};
