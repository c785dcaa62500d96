//! Blocking wrapper for foreign language bindings
//!
//! Foreign callers are synchronous and only understand integers and
//! strings. [`BindingMatcher`] owns a current-thread Tokio runtime and blocks
//! on the async [`KeywordMatcher`]; [`BindingMatcher::match_code`] collapses
//! the outcome to the integer contract (`1`, `0`, or a negative
//! [`ErrorCode`](crate::error::ErrorCode)).

use std::sync::Arc;

use crate::config::KeywordsConfig;
use crate::error::{result_code, KeywordsError};
use crate::matcher::KeywordMatcher;

/// Synchronous matcher for FFI
///
/// Cloneable and thread-safe; clones share the runtime and the cache.
#[derive(Clone)]
pub struct BindingMatcher {
    inner: KeywordMatcher,

    /// Current-thread runtime; `block_on` may be entered from any thread
    runtime: Arc<tokio::runtime::Runtime>,
}

impl BindingMatcher {
    pub fn new(config: &KeywordsConfig) -> Result<Self, KeywordsError> {
        Self::from_matcher(KeywordMatcher::new(config)?)
    }

    /// Matcher configured from the process environment
    pub fn from_env() -> Result<Self, KeywordsError> {
        Self::new(&KeywordsConfig::from_env())
    }

    /// Wrap an existing matcher
    pub fn from_matcher(inner: KeywordMatcher) -> Result<Self, KeywordsError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| KeywordsError::refresh("failed to create Tokio runtime", e))?;

        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    /// Blocking match
    ///
    /// Must not be called from inside an async runtime.
    pub fn match_sync(
        &self,
        text: &str,
        filter: Option<&str>,
        version: Option<&str>,
    ) -> Result<bool, KeywordsError> {
        self.runtime
            .block_on(self.inner.matches(text, filter, version))
    }

    /// Blocking match reduced to the integer contract
    pub fn match_code(&self, text: &str, filter: Option<&str>, version: Option<&str>) -> i32 {
        result_code(&self.match_sync(text, filter, version))
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.inner
    }

    pub fn version(&self) -> String {
        format!("koko-keywords-core {}", env!("CARGO_PKG_VERSION"))
    }
}

// Thread safety assertions
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    fn _assertions() {
        assert_send::<BindingMatcher>();
        assert_sync::<BindingMatcher>();
        assert_send::<KeywordMatcher>();
        assert_sync::<KeywordMatcher>();
    }
};
