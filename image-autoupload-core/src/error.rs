//! Error types shared by the core flows.
//!
//! Per-item and per-rule errors are collected into reports by the flows that
//! produce them; none of these are meant to abort a whole batch.

use thiserror::Error;

/// Failure of a host collaborator (workspace, document store, deleter, settings store).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// Failure to upload a single item.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read image: {0}")]
    Host(#[from] HostError),
    /// The uploader answered but did not produce a URL.
    #[error("{0}")]
    Rejected(String),
    /// The uploader could not be reached or returned garbage.
    #[error("upload transport error: {0}")]
    Transport(String),
}

/// Failure to bring one remote image into the repository.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download failed: {0}")]
    Fetch(#[source] HostError),
    #[error("response is not a supported image")]
    NotAnImage,
    #[error("could not save image: {0}")]
    Write(#[source] HostError),
}

/// Persisted configuration that cannot be interpreted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid settings JSON: {0}")]
    InvalidSettings(#[source] serde_json::Error),
    #[error("invalid link replacement configuration: {0}")]
    InvalidLinkReplacement(#[source] serde_json::Error),
}

/// A link replacement rule that could not be compiled.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid regex in rule {rule_id}: {pattern}: {source}")]
    InvalidRegex {
        rule_id: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unsupported regex flag '{flag}' in rule {rule_id}")]
    UnsupportedFlag { rule_id: String, flag: char },
}
