//! Process-wide configuration
//!
//! Read once (normally from the environment) when the engine is created and
//! immutable afterwards.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `KOKO_KEYWORDS_AUTH` | catalog credential (`user:secret`) |
//! | `KOKO_KEYWORDS_URL` | catalog endpoint, may embed `user:secret@` |
//! | `KOKO_KEYWORDS_CACHE_DIR` | directory for the durable catalog copy |
//! | `KOKO_KEYWORDS_CACHE_TTL_SECS` | how long an unpinned catalog stays fresh |
//! | `KOKO_KEYWORDS_TIMEOUT_SECS` | catalog fetch timeout |
//! | `KOKO_KEYWORDS_NO_DISK_CACHE` | `1`/`true` disables the durable copy |

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::credential::Credential;

/// Default catalog endpoint
pub const DEFAULT_CATALOG_URL: &str = "https://api.kokocares.org/keywords";

/// Default freshness window for an unpinned catalog (15 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Default catalog fetch timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_AUTH: &str = "KOKO_KEYWORDS_AUTH";
pub const ENV_URL: &str = "KOKO_KEYWORDS_URL";
pub const ENV_CACHE_DIR: &str = "KOKO_KEYWORDS_CACHE_DIR";
pub const ENV_CACHE_TTL: &str = "KOKO_KEYWORDS_CACHE_TTL_SECS";
pub const ENV_TIMEOUT: &str = "KOKO_KEYWORDS_TIMEOUT_SECS";
pub const ENV_NO_DISK_CACHE: &str = "KOKO_KEYWORDS_NO_DISK_CACHE";

/// Engine configuration
#[derive(Debug, Clone)]
pub struct KeywordsConfig {
    /// Catalog endpoint with any credentials stripped
    pub endpoint: String,
    pub credential: Option<Credential>,
    /// Explicit durable cache directory; `None` uses the platform cache dir
    pub cache_dir: Option<PathBuf>,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    /// Whether the durable copy is read and written at all
    pub disk_cache: bool,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CATALOG_URL.to_string(),
            credential: None,
            cache_dir: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            disk_cache: true,
        }
    }
}

impl KeywordsConfig {
    /// Configuration for an explicit endpoint with defaults elsewhere
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let mut url_credential = None;
        if let Some(raw) = non_empty(lookup(ENV_URL)) {
            let (endpoint, embedded) = split_url_credential(&raw);
            config.endpoint = endpoint;
            url_credential = embedded;
        }

        config.credential = match (non_empty(lookup(ENV_AUTH)).and_then(Credential::new), url_credential) {
            (Some(auth), Some(_)) => {
                warn!("Both {} and credentials in {} are set; using {}", ENV_AUTH, ENV_URL, ENV_AUTH);
                Some(auth)
            }
            (auth, from_url) => auth.or(from_url),
        };

        config.cache_dir = non_empty(lookup(ENV_CACHE_DIR)).map(PathBuf::from);

        if let Some(secs) = parse_secs(ENV_CACHE_TTL, lookup(ENV_CACHE_TTL)) {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(ENV_TIMEOUT, lookup(ENV_TIMEOUT)) {
            config.fetch_timeout = Duration::from_secs(secs.max(1));
        }

        config.disk_cache = !matches!(
            non_empty(lookup(ENV_NO_DISK_CACHE)).as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("1" | "true" | "yes")
        );

        debug!(
            endpoint = %config.endpoint,
            credential = config.credential.is_some(),
            disk_cache = config.disk_cache,
            "Loaded keywords configuration"
        );
        config
    }

    pub fn with_credential(mut self, token: impl Into<String>) -> Self {
        self.credential = Credential::new(token);
        self
    }

    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn without_disk_cache(mut self) -> Self {
        self.disk_cache = false;
        self
    }

    /// Directory for the durable copy, if persistence is enabled and a
    /// directory can be determined
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        if !self.disk_cache {
            return None;
        }
        self.cache_dir.clone().or_else(default_cache_dir)
    }
}

/// Platform cache directory for the durable catalog copy
pub fn default_cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "kokocares", "koko-keywords")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .or_else(|| dirs::cache_dir().map(|d| d.join("koko-keywords")))
}

/// Separate `user:secret@` from an endpoint URL
///
/// Unparseable input is returned untouched so the fetcher can report it.
fn split_url_credential(raw: &str) -> (String, Option<Credential>) {
    let Ok(mut url) = url::Url::parse(raw) else {
        return (raw.to_string(), None);
    };

    if url.username().is_empty() {
        return (raw.to_string(), None);
    }

    let token = match url.password() {
        Some(password) => format!("{}:{}", url.username(), password),
        None => url.username().to_string(),
    };

    // Only fails for URLs that cannot carry credentials, which never
    // reach here with a username.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    (url.to_string(), Credential::new(token))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_secs(name: &str, value: Option<String>) -> Option<u64> {
    let value = non_empty(value)?;
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a whole number of seconds", name, value);
            None
        }
    }
}
