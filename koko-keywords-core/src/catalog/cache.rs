//! Single-flight catalog cache
//!
//! Holds the current (dataset, index) pair as one `Arc` snapshot. Readers
//! clone the `Arc` under a short read lock; a refresh builds a complete new
//! snapshot off to the side and swaps it in only when every step succeeded.
//!
//! At most one refresh runs at a time. Callers that need a refresh while one
//! is in flight wait on the same shared future and observe its outcome,
//! success or failure, instead of issuing their own fetch.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CatalogSource, DiskStore};
use crate::config::{KeywordsConfig, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT};
use crate::credential::CredentialGate;
use crate::error::KeywordsError;
use crate::filter::Filter;
use crate::index::KeywordIndex;

/// Freshness and timeout settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long an unpinned snapshot is served before refetching
    pub ttl: Duration,
    /// Upper bound on one catalog fetch
    pub fetch_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl CachePolicy {
    pub fn from_config(config: &KeywordsConfig) -> Self {
        Self {
            ttl: config.cache_ttl,
            fetch_timeout: config.fetch_timeout,
        }
    }
}

/// An immutable (dataset, index) pair
#[derive(Debug)]
pub struct CatalogSnapshot {
    index: Arc<KeywordIndex>,
    /// Version asked for when this snapshot was fetched; `None` for latest
    requested_version: Option<String>,
}

impl CatalogSnapshot {
    pub fn index(&self) -> &Arc<KeywordIndex> {
        &self.index
    }

    pub fn version(&self) -> &str {
        self.index.version()
    }

    pub fn requested_version(&self) -> Option<&str> {
        self.requested_version.as_deref()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.index.dataset().fetched_at
    }

    /// Whether this snapshot answers a request for `pin` under `filter`
    ///
    /// A pin is served by any snapshot of that version. A latest request is
    /// served by any snapshot younger than `ttl`, pinned or not. A regex
    /// catalog additionally serves only the filter it was fetched for.
    fn serves(
        &self,
        pin: Option<&str>,
        filter: Option<&Filter>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let dataset = self.index.dataset();
        if !dataset.answers(filter) {
            return false;
        }
        match pin {
            Some(pin) => self.version() == pin,
            None => dataset.age(now) <= ttl,
        }
    }
}

type RefreshOutcome = Result<Arc<CatalogSnapshot>, KeywordsError>;
type Refresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// What a refresh was started for
#[derive(Debug, Clone, PartialEq, Eq)]
struct Request {
    version: Option<String>,
    filter: Option<Filter>,
}

impl Request {
    fn new(version: Option<&str>, filter: Option<&Filter>) -> Self {
        Self {
            version: version.map(str::to_owned),
            filter: filter.cloned(),
        }
    }

    fn is(&self, version: Option<&str>, filter: Option<&Filter>) -> bool {
        self.version.as_deref() == version && self.filter.as_ref() == filter
    }
}

struct InFlight {
    id: u64,
    request: Request,
    refresh: Refresh,
}

enum Ticket {
    Ready(Arc<CatalogSnapshot>),
    Wait { request: Request, refresh: Refresh },
}

struct CacheInner {
    source: Arc<dyn CatalogSource>,
    gate: CredentialGate,
    store: Option<DiskStore>,
    policy: CachePolicy,
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
    in_flight: Mutex<Option<InFlight>>,
    next_flight: AtomicU64,
}

/// Cloneable handle on the process catalog cache
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("endpoint", &self.inner.source.endpoint())
            .field("store", &self.inner.store)
            .field("policy", &self.inner.policy)
            .field("version", &self.snapshot().map(|s| s.version().to_string()))
            .finish()
    }
}

impl CatalogCache {
    /// Create the cache, seeding it from the durable copy when one exists
    pub fn new(
        source: Arc<dyn CatalogSource>,
        gate: CredentialGate,
        store: Option<DiskStore>,
        policy: CachePolicy,
    ) -> Self {
        let seed = store.as_ref().and_then(load_seed);

        Self {
            inner: Arc::new(CacheInner {
                source,
                gate,
                store,
                policy,
                current: RwLock::new(seed),
                in_flight: Mutex::new(None),
                next_flight: AtomicU64::new(0),
            }),
        }
    }

    /// Create the cache for `config`, with the durable copy (if enabled)
    /// keyed by the source's endpoint
    pub fn from_config(source: Arc<dyn CatalogSource>, config: &KeywordsConfig) -> Self {
        let store = config
            .resolved_cache_dir()
            .map(|dir| DiskStore::for_endpoint(dir, source.endpoint()));
        if config.disk_cache && store.is_none() {
            warn!("Could not determine a cache directory; catalog will not be persisted");
        }

        Self::new(
            source,
            CredentialGate::new(config.credential.clone()),
            store,
            CachePolicy::from_config(config),
        )
    }

    /// Index answering `version_pin` (or the freshest dataset for `None`)
    ///
    /// The credential is checked first on every call, so a missing
    /// credential fails before any fetch even when data is cached.
    pub async fn get_index(
        &self,
        version_pin: Option<&str>,
    ) -> Result<Arc<KeywordIndex>, KeywordsError> {
        self.index_for(version_pin, None).await
    }

    /// Index able to answer lookups under `filter`
    ///
    /// Differs from [`CatalogCache::get_index`] only when the service
    /// filters server-side, in which case the filter is sent with the fetch.
    pub async fn index_for(
        &self,
        version_pin: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Arc<KeywordIndex>, KeywordsError> {
        self.inner.gate.ensure_credential()?;

        if let Some(snapshot) = self.usable(version_pin, filter) {
            debug!("Catalog cache hit (version {})", snapshot.version());
            return Ok(Arc::clone(&snapshot.index));
        }

        loop {
            match self.join_or_start(version_pin, filter, false) {
                Ticket::Ready(snapshot) => return Ok(Arc::clone(&snapshot.index)),
                Ticket::Wait { request, refresh } => {
                    let outcome = refresh.await;
                    if request.is(version_pin, filter) {
                        return outcome.map(|snapshot| Arc::clone(&snapshot.index));
                    }
                    // Waited on another request's refresh; its result may
                    // or may not serve this one.
                }
            }
        }
    }

    /// Fetch now, regardless of what is cached
    pub async fn refresh(
        &self,
        version_pin: Option<&str>,
    ) -> Result<Arc<CatalogSnapshot>, KeywordsError> {
        self.inner.gate.ensure_credential()?;

        loop {
            match self.join_or_start(version_pin, None, true) {
                Ticket::Ready(snapshot) => return Ok(snapshot),
                Ticket::Wait { request, refresh } => {
                    let outcome = refresh.await;
                    if request.is(version_pin, None) {
                        return outcome;
                    }
                }
            }
        }
    }

    /// Current snapshot, if any
    pub fn snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        read(&self.inner.current)
    }

    /// Drop the in-memory snapshot and delete the durable copy
    pub fn clear(&self) -> anyhow::Result<()> {
        *write(&self.inner.current) = None;
        if let Some(store) = &self.inner.store {
            store.remove()?;
        }
        info!("Cleared catalog cache");
        Ok(())
    }

    pub fn store(&self) -> Option<&DiskStore> {
        self.inner.store.as_ref()
    }

    pub fn endpoint(&self) -> &str {
        self.inner.source.endpoint()
    }

    fn usable(
        &self,
        version_pin: Option<&str>,
        filter: Option<&Filter>,
    ) -> Option<Arc<CatalogSnapshot>> {
        self.snapshot()
            .filter(|s| s.serves(version_pin, filter, self.inner.policy.ttl, Utc::now()))
    }

    /// Join the refresh in flight, or start one if none is running
    fn join_or_start(
        &self,
        version_pin: Option<&str>,
        filter: Option<&Filter>,
        force: bool,
    ) -> Ticket {
        let mut in_flight = lock(&self.inner.in_flight);

        if let Some(flight) = in_flight.as_ref() {
            debug!("Joining catalog refresh #{} in flight", flight.id);
            return Ticket::Wait {
                request: flight.request.clone(),
                refresh: flight.refresh.clone(),
            };
        }

        // A refresh may have finished between the caller's check and here
        if !force {
            if let Some(snapshot) = self.usable(version_pin, filter) {
                return Ticket::Ready(snapshot);
            }
        }

        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(version_pin, filter);
        debug!("Starting catalog refresh #{} ({:?})", id, request);

        let inner = Arc::clone(&self.inner);
        let flight_request = request.clone();
        let refresh = async move {
            let fetch = inner.fetch_snapshot(
                flight_request.version.as_deref(),
                flight_request.filter.as_ref(),
            );
            let outcome = AssertUnwindSafe(fetch)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(KeywordsError::refresh_msg("catalog refresh panicked")));
            if let Err(e) = &outcome {
                e.log();
            }
            inner.finish_flight(id, &outcome);
            outcome
        }
        .boxed()
        .shared();

        *in_flight = Some(InFlight {
            id,
            request: request.clone(),
            refresh: refresh.clone(),
        });

        Ticket::Wait { request, refresh }
    }
}

impl CacheInner {
    /// Fetch, validate, index and persist one dataset
    async fn fetch_snapshot(
        &self,
        version_pin: Option<&str>,
        filter: Option<&Filter>,
    ) -> RefreshOutcome {
        let credential = self.gate.ensure_credential()?;

        let fetch = self.source.fetch(&credential, version_pin, filter);
        let dataset = tokio::time::timeout(self.policy.fetch_timeout, fetch)
            .await
            .map_err(|_| {
                KeywordsError::refresh_msg(format!(
                    "catalog fetch timed out after {:?}",
                    self.policy.fetch_timeout
                ))
            })??;

        if let Some(pin) = version_pin {
            if dataset.version != pin {
                return Err(KeywordsError::parse_msg(format!(
                    "requested catalog version {} but received {}",
                    pin, dataset.version
                )));
            }
        }

        let index = Arc::new(KeywordIndex::build(Arc::new(dataset))?);

        if let Some(store) = &self.store {
            if let Err(e) = store.save(index.dataset(), version_pin) {
                warn!("Failed to save catalog cache: {:#}", e);
            }
        }

        info!(
            "Refreshed keyword catalog: version {} ({} entries)",
            index.version(),
            index.entry_count()
        );

        Ok(Arc::new(CatalogSnapshot {
            index,
            requested_version: version_pin.map(str::to_owned),
        }))
    }

    /// Install a successful outcome and retire the flight
    ///
    /// Both happen under the in-flight lock, so no caller can observe the
    /// flight gone and the old snapshot still current.
    fn finish_flight(&self, id: u64, outcome: &RefreshOutcome) {
        let mut in_flight = lock(&self.in_flight);

        if let Ok(snapshot) = outcome {
            *write(&self.current) = Some(Arc::clone(snapshot));
        }
        if in_flight.as_ref().is_some_and(|f| f.id == id) {
            *in_flight = None;
        }
    }
}

fn load_seed(store: &DiskStore) -> Option<Arc<CatalogSnapshot>> {
    let stored = match store.load() {
        Ok(Some(stored)) => stored,
        Ok(None) => return None,
        Err(e) => {
            warn!("Ignoring catalog cache: {:#}", e);
            return None;
        }
    };

    match KeywordIndex::build(Arc::new(stored.dataset)) {
        Ok(index) => {
            debug!("Seeded catalog cache with version {}", index.version());
            Some(Arc::new(CatalogSnapshot {
                index: Arc::new(index),
                requested_version: stored.requested_version,
            }))
        }
        Err(e) => {
            warn!("Ignoring catalog cache {}: {}", store.path().display(), e);
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
