//! Keyword catalog - datasets, where they come from, and where they are kept
//!
//! # Architecture
//!
//! ```text
//! Catalog service (HTTPS, basic auth)
//!     │
//!     │  GET /keywords[?version=V][&filter=K=V]
//!     ▼
//! CatalogSource ──────► Dataset ──────► KeywordIndex
//!                                            │
//!                                            ▼
//!                                  CatalogCache (Arc snapshot,
//!                                  single-flight refresh)
//!                                            │
//!                                            ▼
//!                     <cache dir>/catalog_<hash>.json  ← durable seed
//! ```

mod cache;
mod dataset;
mod fetcher;
mod store;

pub use cache::{CachePolicy, CatalogCache, CatalogSnapshot};
pub use dataset::{Dataset, KeywordEntry, MatchMode};
pub use fetcher::{CatalogSource, HttpCatalogFetcher, StaticCatalogSource};
pub use store::{DiskStore, StoredCatalog, STORE_FORMAT};
