//! Error taxonomy and caller-facing codes
//!
//! Every failure the engine can surface is one of five kinds. Internally
//! they travel as [`KeywordsError`] (with the underlying cause attached for
//! logging); at the narrow boundary they collapse to an [`ErrorCode`], whose
//! integer values are part of the public contract and must never change.

use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable error cause
///
/// Refresh outcomes are shared between every caller waiting on the same
/// in-flight fetch, so the cause has to be cloneable.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Engine failure kinds
#[derive(Error, Debug, Clone)]
pub enum KeywordsError {
    /// No credential configured
    #[error("No catalog credential configured.\n\nSet KOKO_KEYWORDS_AUTH, or embed credentials in KOKO_KEYWORDS_URL.")]
    AuthMissing,

    /// The catalog service rejected the credential
    #[error("Catalog service rejected the configured credential (HTTP {status})")]
    AuthInvalid { status: u16 },

    /// Transport-level refresh failure (timeout, connection, unexpected status)
    #[error("Catalog refresh failed: {reason}")]
    CacheRefresh {
        reason: String,
        #[source]
        source: Option<Cause>,
    },

    /// The catalog response could not be turned into a dataset
    #[error("Catalog response could not be parsed: {reason}")]
    ResponseParse {
        reason: String,
        #[source]
        source: Option<Cause>,
    },

    /// The catalog endpoint is not a usable URL
    #[error("Catalog service URL '{url}' is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl KeywordsError {
    /// Refresh failure with an underlying cause
    pub fn refresh<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        KeywordsError::CacheRefresh {
            reason: reason.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Refresh failure without a cause
    pub fn refresh_msg(reason: impl Into<String>) -> Self {
        KeywordsError::CacheRefresh {
            reason: reason.into(),
            source: None,
        }
    }

    /// Parse failure with an underlying cause
    pub fn parse<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        KeywordsError::ResponseParse {
            reason: reason.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Parse failure without a cause
    pub fn parse_msg(reason: impl Into<String>) -> Self {
        KeywordsError::ResponseParse {
            reason: reason.into(),
            source: None,
        }
    }

    /// Invalid endpoint. User-info is redacted before it is stored.
    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        KeywordsError::InvalidUrl {
            url: redact_userinfo(url),
            reason: reason.into(),
        }
    }

    /// The stable caller-facing code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            KeywordsError::AuthMissing => ErrorCode::AuthMissing,
            KeywordsError::AuthInvalid { .. } => ErrorCode::AuthInvalid,
            KeywordsError::CacheRefresh { .. } => ErrorCode::CacheRefreshFailure,
            KeywordsError::ResponseParse { .. } => ErrorCode::ResponseParseFailure,
            KeywordsError::InvalidUrl { .. } => ErrorCode::InvalidUrl,
        }
    }

    /// Log the failure with its full cause chain
    pub fn log(&self) {
        let mut chain = String::new();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        match self {
            KeywordsError::AuthMissing | KeywordsError::AuthInvalid { .. } => {
                tracing::error!(code = self.code().as_i32(), "{}{}", self, chain);
            }
            _ => tracing::warn!(code = self.code().as_i32(), "{}{}", self, chain),
        }
    }
}

/// Caller-facing error codes
///
/// External callers branch on these literal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    AuthMissing = -1,
    AuthInvalid = -2,
    CacheRefreshFailure = -3,
    ResponseParseFailure = -4,
    InvalidUrl = -5,
}

/// Result code for a successful match
pub const MATCH: i32 = 1;

/// Result code for a successful non-match
pub const NO_MATCH: i32 = 0;

/// Description returned for codes outside the table
pub const UNKNOWN_ERROR_DESCRIPTION: &str = "Unknown error code";

impl ErrorCode {
    pub const ALL: [ErrorCode; 5] = [
        ErrorCode::AuthMissing,
        ErrorCode::AuthInvalid,
        ErrorCode::CacheRefreshFailure,
        ErrorCode::ResponseParseFailure,
        ErrorCode::InvalidUrl,
    ];

    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Look up a code; `None` for success values and unknown codes
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| i64::from(c.as_i32()) == code)
    }

    /// Human-readable description shipped to every binding
    pub const fn description(self) -> &'static str {
        match self {
            ErrorCode::AuthMissing => {
                "KOKO_KEYWORDS_AUTH must be set before importing the library"
            }
            ErrorCode::AuthInvalid => {
                "Invalid credentials. Please confirm you are using valid credentials, contact us at api.kokocares.org if you need assistance."
            }
            ErrorCode::CacheRefreshFailure => {
                "Unable to refresh cache. Please try again or contact us at api.kokocares.org if this issue persists."
            }
            ErrorCode::ResponseParseFailure => {
                "Unable to parse response from API. Please contact us at api.kokocares.org if this issue persists."
            }
            ErrorCode::InvalidUrl => "Invalid url. Please ensure the url used is valid.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Description for a raw boundary code
pub fn error_description(code: i64) -> &'static str {
    ErrorCode::from_code(code)
        .map(ErrorCode::description)
        .unwrap_or(UNKNOWN_ERROR_DESCRIPTION)
}

/// Collapse a match outcome to its boundary integer
pub fn result_code(result: &Result<bool, KeywordsError>) -> i32 {
    match result {
        Ok(true) => MATCH,
        Ok(false) => NO_MATCH,
        Err(e) => e.code().as_i32(),
    }
}

/// Strip `user:secret@` from an endpoint before it is shown anywhere
pub(crate) fn redact_userinfo(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) if !url.cannot_be_a_base() => {
            if url.username().is_empty() && url.password().is_none() {
                return raw.to_string();
            }
            // Both setters only fail for URLs without an authority
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        // Opaque or unparseable; whatever precedes an '@' may be a secret
        _ => match raw.rsplit_once('@') {
            Some((_, rest)) => format!("***@{rest}"),
            None => raw.to_string(),
        },
    }
}
