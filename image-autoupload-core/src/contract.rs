//! # contract: collaborator interfaces of the image upload pipeline
//!
//! Everything the core needs from its host is expressed as a trait here:
//!
//! - [`Uploader`]: turns local files or remote links into hosted URLs.
//! - [`Document`]: the text of the active note (read, replace, ranges, selection).
//! - [`Workspace`]: the repository of files the note lives in.
//! - [`Deleter`]: trashes local files and deletes previously uploaded images.
//! - [`Fetcher`]: downloads remote images into the repository.
//! - [`SettingsStore`]: persists [`Settings`] after cache and registry writes.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, exported under the default
//!   `test-export-mocks` feature so integration tests can build deterministic mocks.
//!
//! ## Error Handling
//! - Host failures are reported as [`HostError`]; upload failures as [`UploadError`].
//!   The flows in this crate collect these per item and never abort a batch on them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{HostError, UploadError};
use crate::settings::{Settings, UploadedImage};

/// A file of the repository, addressed by its repository-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoFile {
    /// Full path inside the repository, `/`-separated, no leading slash.
    pub path: String,
    /// Basename including extension.
    pub name: String,
}

impl RepoFile {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self { path, name }
    }

    /// Lowercased extension, if the name has one.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Directory part of the path; empty for files at the repository root.
    pub fn parent_dir(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }
}

/// One item handed to the [`Uploader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadItem {
    /// A repository file plus the display name it is referenced by.
    File { file: RepoFile, name: String },
    /// A bare path: a remote URL or an absolute filesystem path.
    Path(String),
}

/// Result of [`Uploader::upload`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadResponse {
    pub success: bool,
    /// Hosted URLs, in the same order as the accepted items.
    pub urls: Vec<String>,
    pub message: Option<String>,
    /// Registry records to remember for later deletion.
    pub records: Vec<UploadedImage>,
}

/// A file as found on the native clipboard or in a drop event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardFile {
    pub name: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Filesystem path when the platform exposes one.
    pub path: Option<String>,
}

impl ClipboardFile {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image")
    }
}

/// `{ code, data | message }` envelope returned by the clipboard entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardResponse {
    /// `0` on success.
    pub code: i32,
    pub data: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: Option<String>,
}

/// A position inside a document: zero-based line and byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

/// Image hosting service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload the given items. URLs come back in the order of the accepted items.
    async fn upload(&self, items: Vec<UploadItem>) -> Result<UploadResponse, UploadError>;

    /// Upload the files currently on the native clipboard.
    async fn upload_clipboard(
        &self,
        files: Vec<ClipboardFile>,
    ) -> Result<ClipboardResponse, UploadError>;
}

/// The active note's text buffer.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Document: Send + Sync {
    fn get_value(&self) -> String;

    fn set_value(&self, content: &str);

    /// Replace the text between `from` and `to` (same line semantics as the editor).
    fn replace_range(&self, replacement: &str, from: Position, to: Position);

    fn selection(&self) -> Option<String>;

    /// Replace the current selection, or insert at the cursor when nothing is selected.
    fn replace_selection(&self, replacement: &str);
}

/// The repository of files the active note belongs to.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Workspace: Send + Sync {
    /// All files of the repository, in a stable enumeration order.
    fn files(&self) -> Vec<RepoFile>;

    /// The note currently being edited, if any.
    fn active_file(&self) -> Option<RepoFile>;

    async fn read_binary(&self, file: &RepoFile) -> Result<Vec<u8>, HostError>;

    /// Create or overwrite `file`, creating missing parent folders.
    async fn write_binary(&self, file: &RepoFile, bytes: &[u8]) -> Result<(), HostError>;
}

/// Plain HTTP(S) download of a remote resource.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// The response body; a non-success status is an error.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HostError>;
}

/// Removal of local sources and previously uploaded images.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Deleter: Send + Sync {
    /// Move a repository file to the trash.
    async fn trash_file(&self, file: &RepoFile) -> Result<(), HostError>;

    /// Delete previously uploaded images from the image host.
    async fn delete_uploaded(
        &self,
        records: Vec<UploadedImage>,
    ) -> Result<DeleteResponse, HostError>;
}

/// Persistence of the settings object.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn save(&self, settings: &Settings) -> Result<(), HostError>;
}

/// The collaborators one editor session hands to the flows of this crate.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub document: &'a dyn Document,
    pub workspace: &'a dyn Workspace,
    pub uploader: &'a dyn Uploader,
    pub deleter: &'a dyn Deleter,
    pub store: &'a dyn SettingsStore,
}
