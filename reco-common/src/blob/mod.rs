//! Blob store contract
//!
//! File-mode ingestion reads its input from an object referenced as
//! `store://bucket/key`. The service only needs to know whether the object
//! exists and to stream it line by line.

pub mod http;
pub mod local;

pub use http::HttpBlobStore;
pub use local::LocalBlobStore;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::io::AsyncBufRead;

use crate::{Error, Result};

/// Readable byte stream of one blob
pub type BlobReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// URI schemes accepted for blob references
const ACCEPTED_SCHEMES: &[&str] = &["store", "s3", "gs"];

/// Parsed reference to one object in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub scheme: String,
    pub bucket: String,
    pub key: String,
}

impl FromStr for BlobLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| Error::InvalidInput(format!("Data location has no scheme: {}", s)))?;

        if !ACCEPTED_SCHEMES.contains(&scheme) {
            return Err(Error::InvalidInput(format!(
                "Unsupported data location scheme '{}' (expected one of: {})",
                scheme,
                ACCEPTED_SCHEMES.join(", ")
            )));
        }

        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| Error::InvalidInput(format!("Data location has no object key: {}", s)))?;

        if bucket.is_empty() || key.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Data location needs both bucket and key: {}",
                s
            )));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

/// Abstract object store
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, location: &BlobLocation) -> Result<bool>;

    async fn open(&self, location: &BlobLocation) -> Result<BlobReader>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_store_uri() {
        let location: BlobLocation = "store://recs/2024/batch.jsonl".parse().unwrap();
        assert_eq!(location.scheme, "store");
        assert_eq!(location.bucket, "recs");
        assert_eq!(location.key, "2024/batch.jsonl");
        assert_eq!(location.to_string(), "store://recs/2024/batch.jsonl");
    }

    #[test]
    fn test_parse_rejects_malformed_references() {
        for bad in [
            "recs/batch.jsonl",
            "ftp://recs/batch.jsonl",
            "store://recs",
            "store:///batch.jsonl",
            "store://recs/",
        ] {
            assert!(
                matches!(bad.parse::<BlobLocation>(), Err(Error::InvalidInput(_))),
                "expected rejection for {}",
                bad
            );
        }
    }
}
