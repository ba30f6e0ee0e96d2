//! Filesystem blob backend: `<root>/<bucket>/<key>`

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::BufReader;

use super::{BlobLocation, BlobReader, BlobStore};
use crate::{Error, Result};

/// Blob store serving objects from a local directory tree
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a location to a path below the root, refusing `..` escapes
    fn resolve(&self, location: &BlobLocation) -> Result<PathBuf> {
        let relative = Path::new(&location.bucket).join(&location.key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(Error::InvalidInput(format!(
                "Data location escapes blob root: {}",
                location
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn exists(&self, location: &BlobLocation) -> Result<bool> {
        let path = self.resolve(location)?;
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn open(&self, location: &BlobLocation) -> Result<BlobReader> {
        let path = self.resolve(location)?;
        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("Blob not found: {}", location))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(Box::new(BufReader::new(file)))
    }
}
