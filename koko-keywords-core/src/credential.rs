//! Catalog credential and the gate every catalog operation passes through

use std::fmt;

use crate::error::KeywordsError;

/// Opaque catalog service token
///
/// Never printed; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token; `None` if it is empty or whitespace
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// HTTP Basic auth parts: `user:secret` splits at the first colon,
    /// anything else is a username without password
    pub fn basic_auth(&self) -> (&str, Option<&str>) {
        match self.0.split_once(':') {
            Some((user, secret)) => (user, Some(secret)),
            None => (self.0.as_str(), None),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Validates that a credential is configured before the catalog is touched
///
/// Holds the value captured when configuration was read; it never
/// re-reads the environment.
#[derive(Debug, Clone, Default)]
pub struct CredentialGate {
    credential: Option<Credential>,
}

impl CredentialGate {
    pub fn new(credential: Option<Credential>) -> Self {
        Self { credential }
    }

    pub fn ensure_credential(&self) -> Result<Credential, KeywordsError> {
        self.credential.clone().ok_or(KeywordsError::AuthMissing)
    }

    pub fn is_configured(&self) -> bool {
        self.credential.is_some()
    }
}
