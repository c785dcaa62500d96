//! Koko Keywords core
//!
//! Matches free text against a remotely published, versioned keyword
//! catalog. The catalog is fetched on demand, indexed once per version, and
//! kept in a process-wide cache backed by a durable copy on disk.
//!
//! ```no_run
//! # async fn demo() -> Result<(), koko_keywords_core::KeywordsError> {
//! use koko_keywords_core::{KeywordMatcher, KeywordsConfig};
//!
//! let matcher = KeywordMatcher::new(&KeywordsConfig::from_env())?;
//! let risky = matcher.matches("sewerslide", Some("category=self-harm"), None).await?;
//! # let _ = risky;
//! # Ok(())
//! # }
//! ```

pub mod bindings;
pub mod catalog;
pub mod config;
pub mod credential;
pub mod error;
pub mod filter;
pub mod index;
pub mod matcher;

pub use bindings::BindingMatcher;
pub use config::KeywordsConfig;
pub use error::{error_description, ErrorCode, KeywordsError};
pub use filter::Filter;
pub use index::KeywordIndex;
pub use matcher::KeywordMatcher;
