//! Data Extractor
//!
//! Collects the values a server render used so they can be shipped to the
//! client alongside the markup.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::factory::DEFAULT_CACHE_VAR;
use crate::snapshot::{self, CacheData};

use super::RenderContext;

/// Options for [`DataExtractor::new`].
#[derive(Debug, Clone, Default)]
pub struct ExtractorOptions {
    cache_var: Option<String>,
}

impl ExtractorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Global variable the script assigns the snapshot to.
    pub fn cache_var(mut self, cache_var: impl Into<String>) -> Self {
        self.cache_var = Some(cache_var.into());
        self
    }
}

/// Accumulates rendered values for one page.
///
/// ```rust,ignore
/// let extractor = DataExtractor::new(ExtractorOptions::new())?;
/// let ctx = extractor.collect_data();
/// {
///     let _scope = ctx.enter();
///     render_app(&ctx).await;
/// }
/// let html = format!("{}{}", markup, extractor.script()?);
/// ```
#[derive(Debug)]
pub struct DataExtractor {
    cache_var: String,
    snapshot: Arc<Mutex<CacheData>>,
}

impl DataExtractor {
    pub fn new(options: ExtractorOptions) -> Result<Self, Error> {
        Ok(Self {
            cache_var: validate_cache_var(options.cache_var)?,
            snapshot: Arc::new(Mutex::new(CacheData::new())),
        })
    }

    /// A fresh render context whose rendered values land in this extractor.
    pub fn collect_data(&self) -> RenderContext {
        RenderContext::new(Arc::clone(&self.snapshot))
    }

    /// Snapshot of everything registered so far.
    pub fn data(&self) -> CacheData {
        self.snapshot.lock().clone()
    }

    pub fn cache_var(&self) -> &str {
        &self.cache_var
    }

    /// Script element that installs the snapshot under the configured
    /// cache variable.
    pub fn script(&self) -> Result<String, Error> {
        self.render_script(&self.cache_var)
    }

    /// Like [`DataExtractor::script`] with a different cache variable.
    pub fn script_with(&self, cache_var: &str) -> Result<String, Error> {
        if cache_var.is_empty() {
            return Err(Error::EmptyCacheVar);
        }
        self.render_script(cache_var)
    }

    fn render_script(&self, cache_var: &str) -> Result<String, Error> {
        let data = self.snapshot.lock();
        debug!(cache_var, factories = data.len(), "rendering data script");
        snapshot::script(cache_var, &data)
    }
}

fn validate_cache_var(cache_var: Option<String>) -> Result<String, Error> {
    match cache_var {
        Some(cache_var) if cache_var.is_empty() => Err(Error::EmptyCacheVar),
        Some(cache_var) => Ok(cache_var),
        None => Ok(DEFAULT_CACHE_VAR.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_shared_cache_var() {
        let extractor = DataExtractor::new(ExtractorOptions::new()).unwrap();
        assert_eq!(extractor.cache_var(), DEFAULT_CACHE_VAR);
        assert!(extractor.data().is_empty());
    }

    #[test]
    fn rejects_empty_cache_var() {
        assert!(matches!(
            DataExtractor::new(ExtractorOptions::new().cache_var("")),
            Err(Error::EmptyCacheVar)
        ));

        let extractor = DataExtractor::new(ExtractorOptions::new()).unwrap();
        assert!(matches!(extractor.script_with(""), Err(Error::EmptyCacheVar)));
    }

    #[test]
    fn empty_script() {
        let extractor = DataExtractor::new(ExtractorOptions::new().cache_var("CACHE")).unwrap();
        assert_eq!(
            extractor.script().unwrap(),
            r#"<script>(window["CACHE"]=window["CACHE"]||{}).data={}</script>"#
        );
        assert_eq!(
            extractor.script_with("OTHER").unwrap(),
            r#"<script>(window["OTHER"]=window["OTHER"]||{}).data={}</script>"#
        );
    }
}
