//! Catalog sources
//!
//! [`CatalogSource`] is the seam between the cache and the network. The
//! production implementation talks HTTP; [`StaticCatalogSource`] serves
//! in-memory datasets for tests and offline use.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::Dataset;
use crate::credential::Credential;
use crate::error::KeywordsError;
use crate::filter::Filter;

/// Something that can produce a catalog dataset
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the latest dataset, or the one named by `version`
    ///
    /// `filter` is passed along for services that filter server-side; a
    /// source returning a complete phrase catalog may ignore it.
    async fn fetch(
        &self,
        credential: &Credential,
        version: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Dataset, KeywordsError>;

    /// Endpoint identity, used to key the durable copy
    fn endpoint(&self) -> &str;
}

/// Fetches datasets from the catalog HTTP service
pub struct HttpCatalogFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCatalogFetcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, KeywordsError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("koko-keywords/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| KeywordsError::refresh("failed to create HTTP client", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Full request URL, validated before any I/O happens
    fn request_url(
        &self,
        version: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Url, KeywordsError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| KeywordsError::invalid_url(&self.endpoint, e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(KeywordsError::invalid_url(
                &self.endpoint,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(KeywordsError::invalid_url(&self.endpoint, "missing host"));
        }

        if let Some(version) = version {
            url.query_pairs_mut().append_pair("version", version);
        }
        if let Some(filter) = filter {
            url.query_pairs_mut().append_pair("filter", &filter.to_string());
        }
        Ok(url)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogFetcher {
    async fn fetch(
        &self,
        credential: &Credential,
        version: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Dataset, KeywordsError> {
        let url = self.request_url(version, filter)?;
        let (user, secret) = credential.basic_auth();

        debug!("Fetching keyword catalog from {} (version: {:?})", self.endpoint, version);

        let response = self
            .client
            .get(url)
            .basic_auth(user, secret)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "catalog service timed out"
                } else {
                    "catalog service unreachable"
                };
                KeywordsError::refresh(reason, e)
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(KeywordsError::AuthInvalid {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(KeywordsError::refresh_msg(format!(
                "catalog service answered HTTP {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KeywordsError::refresh("failed to read catalog body", e))?;

        Dataset::from_catalog_json(&body, Utc::now(), filter)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// In-memory catalog source
///
/// The last dataset is "latest"; a pinned request returns the dataset with
/// that version or fails as a refresh error.
pub struct StaticCatalogSource {
    endpoint: String,
    datasets: Vec<Dataset>,
    accepted: Option<Credential>,
    latency: Option<Duration>,
    fetches: Arc<AtomicUsize>,
}

impl StaticCatalogSource {
    pub fn new(datasets: Vec<Dataset>) -> Self {
        Self {
            endpoint: "memory://catalog".to_string(),
            datasets,
            accepted: None,
            latency: None,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Reject every credential except this one with `AuthInvalid`
    pub fn accepting(mut self, credential: Credential) -> Self {
        self.accepted = Some(credential);
        self
    }

    /// Delay every fetch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of fetches started so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Shared handle on the fetch counter, usable after the source is boxed
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetches)
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch(
        &self,
        credential: &Credential,
        version: Option<&str>,
        _filter: Option<&Filter>,
    ) -> Result<Dataset, KeywordsError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(accepted) = &self.accepted {
            if accepted != credential {
                return Err(KeywordsError::AuthInvalid { status: 401 });
            }
        }

        let dataset = match version {
            Some(v) => self.datasets.iter().find(|d| d.version == v),
            None => self.datasets.last(),
        };

        let mut dataset = dataset.cloned().ok_or_else(|| {
            KeywordsError::refresh_msg(format!(
                "no catalog version {}",
                version.unwrap_or("(latest)")
            ))
        })?;
        dataset.fetched_at = Utc::now();
        Ok(dataset)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
