//! HTTP blob backend: `HEAD`/`GET <base_url>/<bucket>/<key>`
//!
//! The object body is buffered in memory before line reading starts.
// TODO: stream the body once reqwest's `stream` feature is enabled workspace-wide.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{BlobLocation, BlobReader, BlobStore};
use crate::{Error, Result};

/// Blob store backed by an HTTP object gateway
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn object_url(&self, location: &BlobLocation) -> String {
        format!("{}/{}/{}", self.base_url, location.bucket, location.key)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn exists(&self, location: &BlobLocation) -> Result<bool> {
        let response = self
            .client
            .head(self.object_url(location))
            .send()
            .await
            .map_err(|e| Error::Store(format!("Blob HEAD failed: {}", e)))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Error::Store(format!(
                "Blob HEAD for {} returned {}",
                location, s
            ))),
        }
    }

    async fn open(&self, location: &BlobLocation) -> Result<BlobReader> {
        let response = self
            .client
            .get(self.object_url(location))
            .send()
            .await
            .map_err(|e| Error::Store(format!("Blob GET failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Blob not found: {}", location)));
        }
        let response = response
            .error_for_status()
            .map_err(|e| Error::Store(format!("Blob GET for {} failed: {}", location, e)))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Store(format!("Blob body read failed: {}", e)))?;

        Ok(Box::new(Cursor::new(body.to_vec())))
    }
}
