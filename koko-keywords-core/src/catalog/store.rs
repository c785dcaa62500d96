//! Durable copy of the last fetched catalog
//!
//! One JSON file per endpoint, named after a hash of the endpoint so
//! different catalog services never share a file. Writes go through a
//! temporary file in the same directory and an atomic rename, so a reader
//! sees either the previous record or the new one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::Dataset;

/// Record layout version
pub const STORE_FORMAT: u32 = 1;

/// What the durable copy holds
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredCatalog {
    pub format: u32,
    /// Version that was asked for when the dataset was fetched
    pub requested_version: Option<String>,
    pub dataset: Dataset,
}

#[derive(Serialize)]
struct StoredCatalogRef<'a> {
    format: u32,
    requested_version: Option<&'a str>,
    dataset: &'a Dataset,
}

/// File-backed catalog store
#[derive(Debug, Clone)]
pub struct DiskStore {
    path: PathBuf,
}

impl DiskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `endpoint` inside `dir`
    pub fn for_endpoint(dir: impl AsRef<Path>, endpoint: &str) -> Self {
        let digest = Sha256::digest(endpoint.as_bytes());
        let name = format!("catalog_{}.json", &hex::encode(digest)[..16]);
        Self::new(dir.as_ref().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored record; `Ok(None)` if nothing has been stored
    pub fn load(&self) -> Result<Option<StoredCatalog>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read catalog cache: {}", self.path.display()))?;

        let stored: StoredCatalog = serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse catalog cache: {}", self.path.display()))?;

        if stored.format != STORE_FORMAT {
            anyhow::bail!(
                "Unsupported catalog cache format {} in {}",
                stored.format,
                self.path.display()
            );
        }

        debug!(
            "Loaded catalog {} from {}",
            stored.dataset.version,
            self.path.display()
        );
        Ok(Some(stored))
    }

    /// Replace the stored record
    pub fn save(&self, dataset: &Dataset, requested_version: Option<&str>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("Catalog cache path has no parent directory")?;

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;

        let record = StoredCatalogRef {
            format: STORE_FORMAT,
            requested_version,
            dataset,
        };
        let content = serde_json::to_vec(&record).context("Failed to serialize catalog cache")?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        temp.write_all(&content)
            .context("Failed to write catalog cache")?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to write catalog cache: {}", self.path.display()))?;

        debug!("Saved catalog {} to {}", dataset.version, self.path.display());
        Ok(())
    }

    /// Delete the stored record, if any
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove catalog cache: {}", self.path.display())),
        }
    }
}
