//! Content-hash → URL cache.
//!
//! Keys are the SHA-256 of the file bytes at upload time, so an edited file
//! hashes differently and gets uploaded again. Entries are never evicted; the
//! map grows with every distinct image uploaded while caching is enabled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageCache(BTreeMap<String, String>);

impl ImageCache {
    pub fn get(&self, hash: &str) -> Option<&str> {
        self.0.get(hash).map(String::as_str)
    }

    /// Last write wins.
    pub fn insert(&mut self, hash: impl Into<String>, url: impl Into<String>) {
        self.0.insert(hash.into(), url.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
