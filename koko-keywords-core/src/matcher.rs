//! Match engine - the public entry point of the core

use std::sync::Arc;
use tracing::trace;

use crate::catalog::{CatalogCache, CatalogSource, HttpCatalogFetcher, KeywordEntry};
use crate::config::KeywordsConfig;
use crate::error::KeywordsError;
use crate::filter::Filter;

/// Thread-safe, cloneable keyword matcher
///
/// Clones share one catalog cache.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    cache: CatalogCache,
}

impl KeywordMatcher {
    /// Matcher talking to the configured catalog service over HTTP
    pub fn new(config: &KeywordsConfig) -> Result<Self, KeywordsError> {
        let fetcher = HttpCatalogFetcher::new(config.endpoint.clone(), config.fetch_timeout)?;
        Ok(Self::with_source(Arc::new(fetcher), config))
    }

    /// Matcher over an arbitrary catalog source
    pub fn with_source(source: Arc<dyn CatalogSource>, config: &KeywordsConfig) -> Self {
        Self {
            cache: CatalogCache::from_config(source, config),
        }
    }

    pub fn from_cache(cache: CatalogCache) -> Self {
        Self { cache }
    }

    /// Whether `text` contains a keyword of the selected dataset
    ///
    /// `filter` uses `key=value` syntax; an empty string or one without `=`
    /// means no filter. An empty `version` selects the freshest dataset.
    pub async fn matches(
        &self,
        text: &str,
        filter: Option<&str>,
        version: Option<&str>,
    ) -> Result<bool, KeywordsError> {
        let filter = filter.and_then(Filter::parse);
        let index = self
            .cache
            .index_for(version_pin(version), filter.as_ref())
            .await?;

        let matched = index.lookup(text, filter.as_ref());
        trace!(
            version = index.version(),
            filter = ?filter.as_ref().map(ToString::to_string),
            matched,
            "Keyword match"
        );
        Ok(matched)
    }

    /// Entries that hit `text`, for diagnostics
    pub async fn explain(
        &self,
        text: &str,
        filter: Option<&str>,
        version: Option<&str>,
    ) -> Result<Vec<KeywordEntry>, KeywordsError> {
        let filter = filter.and_then(Filter::parse);
        let index = self
            .cache
            .index_for(version_pin(version), filter.as_ref())
            .await?;

        Ok(index
            .matching_entries(text, filter.as_ref())
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }
}

fn version_pin(version: Option<&str>) -> Option<&str> {
    version.map(str::trim).filter(|v| !v.is_empty())
}
