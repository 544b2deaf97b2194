//! Filesystem-backed document store
//!
//! Reads uploaded documents from a root directory. Upload mechanics
//! belong to the external gateway; this adapter only resolves file
//! references to bytes.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use semestra_core::DocumentStore;
use semestra_domain::{FileReference, Result, SemestraError};
use tracing::{debug, instrument};

/// Filesystem implementation of the DocumentStore port.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File references must stay inside the root directory.
    fn resolve(&self, location: &str) -> Result<PathBuf> {
        let relative = Path::new(location);
        let escapes = relative.is_absolute()
            || relative.components().any(|c| matches!(c, Component::ParentDir));
        if escapes {
            return Err(SemestraError::InvalidInput(format!(
                "file reference '{}' escapes the storage root",
                location
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    #[instrument(skip(self), fields(location = %file.location))]
    async fn fetch(&self, file: &FileReference) -> Result<Vec<u8>> {
        let path = self.resolve(&file.location)?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SemestraError::NotFound(format!("stored file '{}' not found", file.location))
            } else {
                SemestraError::Internal(format!("failed to read '{}': {}", file.location, e))
            }
        })?;

        debug!(bytes = bytes.len(), "document fetched");
        Ok(bytes)
    }
}
