//! Filesystem-backed host collaborators: a vault directory as [`Workspace`], a
//! note file as [`Document`], and a [`Deleter`] that trashes into `<vault>/.trash`.
//!
//! Paths inside the vault are `/`-separated and relative to the vault root.
//! Hidden entries (names starting with `.`) are never part of the vault, which
//! keeps the trash and the settings file out of resolution.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use image_autoupload_core::contract::{
    DeleteResponse, Deleter, Document, Position, RepoFile, Workspace,
};
use image_autoupload_core::error::HostError;
use image_autoupload_core::settings::UploadedImage;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::upload::PicGoRemover;

pub const TRASH_DIR: &str = ".trash";

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn vault_relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// A directory of notes and attachments with one active note.
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    active: RepoFile,
}

impl Vault {
    /// Open `root` with `note` (vault-relative) as the active note.
    pub fn open(root: impl Into<PathBuf>, note: &str) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("Vault directory {} does not exist", root.display());
        }
        let note = note.trim_start_matches("./").replace('\\', "/");
        if !root.join(&note).is_file() {
            bail!("Note {} not found in vault {}", note, root.display());
        }
        info!(vault = %root.display(), note = %note, "Opened vault");
        Ok(Self {
            root,
            active: RepoFile::new(note),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active(&self) -> &RepoFile {
        &self.active
    }

    pub fn absolute(&self, file: &RepoFile) -> PathBuf {
        self.root.join(&file.path)
    }

    /// The vault file at `path`, if it exists.
    pub fn file(&self, path: &str) -> Option<RepoFile> {
        let path = path.trim_start_matches("./").replace('\\', "/");
        self.root.join(&path).is_file().then(|| RepoFile::new(path))
    }
}

#[async_trait]
impl Workspace for Vault {
    fn files(&self) -> Vec<RepoFile> {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable vault entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| vault_relative(&self.root, entry.path()))
            .map(RepoFile::new)
            .collect()
    }

    fn active_file(&self) -> Option<RepoFile> {
        Some(self.active.clone())
    }

    async fn read_binary(&self, file: &RepoFile) -> Result<Vec<u8>, HostError> {
        match tokio::fs::read(self.absolute(file)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HostError::NotFound(file.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_binary(&self, file: &RepoFile, bytes: &[u8]) -> Result<(), HostError> {
        let target = self.absolute(file);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        debug!(file = %file.path, bytes = bytes.len(), "Wrote vault file");
        Ok(())
    }
}

fn byte_offset(content: &str, pos: Position) -> usize {
    let line_start: usize = content
        .split_inclusive('\n')
        .take(pos.line)
        .map(str::len)
        .sum();
    let line_len = content[line_start.min(content.len())..]
        .split('\n')
        .next()
        .map(str::len)
        .unwrap_or(0);
    (line_start + pos.ch.min(line_len)).min(content.len())
}

/// A note loaded into memory. The cursor sits at the end of the text.
#[derive(Debug)]
pub struct NoteDocument {
    path: PathBuf,
    original: String,
    content: Mutex<String>,
    selection: Mutex<Option<String>>,
}

impl NoteDocument {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, HostError> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await?;
        debug!(note = %path.display(), bytes = content.len(), "Loaded note");
        Ok(Self {
            path,
            original: content.clone(),
            content: Mutex::new(content),
            selection: Mutex::new(None),
        })
    }

    /// Select `text`; it only counts when the note contains it.
    pub fn select(&self, text: &str) -> bool {
        let found = self.get_value().contains(text);
        if found {
            *self.selection.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.to_string());
        }
        found
    }

    pub fn is_dirty(&self) -> bool {
        self.get_value() != self.original
    }

    /// Write the note back when it changed. Returns whether anything was written.
    pub async fn save(&self) -> Result<bool, HostError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        tokio::fs::write(&self.path, self.get_value()).await?;
        info!(note = %self.path.display(), "Saved note");
        Ok(true)
    }
}

impl Document for NoteDocument {
    fn get_value(&self) -> String {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_value(&self, content: &str) {
        *self.content.lock().unwrap_or_else(PoisonError::into_inner) = content.to_string();
    }

    fn replace_range(&self, replacement: &str, from: Position, to: Position) {
        let mut content = self.content.lock().unwrap_or_else(PoisonError::into_inner);
        let start = byte_offset(&content, from);
        let end = byte_offset(&content, to).max(start);
        if content.is_char_boundary(start) && content.is_char_boundary(end) {
            content.replace_range(start..end, replacement);
        } else {
            warn!(?from, ?to, "Ignoring replacement that splits a character");
        }
    }

    fn selection(&self) -> Option<String> {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_selection(&self, replacement: &str) {
        let selected = self
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut content = self.content.lock().unwrap_or_else(PoisonError::into_inner);
        match selected {
            Some(selected) => *content = content.replacen(&selected, replacement, 1),
            None => content.push_str(replacement),
        }
    }
}

/// Trashes vault files locally and deletes uploaded images through PicGo.
pub struct VaultDeleter {
    root: PathBuf,
    remover: PicGoRemover,
}

impl VaultDeleter {
    pub fn new(root: impl Into<PathBuf>, remover: PicGoRemover) -> Self {
        Self {
            root: root.into(),
            remover,
        }
    }

    /// A path inside the trash that does not exist yet.
    fn trash_target(&self, name: &str) -> PathBuf {
        let trash = self.root.join(TRASH_DIR);
        let candidate = trash.join(name);
        if !candidate.exists() {
            return candidate;
        }
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
            _ => (name, String::new()),
        };
        (1..)
            .map(|n| trash.join(format!("{stem} {n}{ext}")))
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }
}

#[async_trait]
impl Deleter for VaultDeleter {
    async fn trash_file(&self, file: &RepoFile) -> Result<(), HostError> {
        tokio::fs::create_dir_all(self.root.join(TRASH_DIR)).await?;
        let target = self.trash_target(&file.name);
        tokio::fs::rename(self.root.join(&file.path), &target).await?;
        debug!(file = %file.path, trash = %target.display(), "Moved file to trash");
        Ok(())
    }

    async fn delete_uploaded(
        &self,
        records: Vec<UploadedImage>,
    ) -> Result<DeleteResponse, HostError> {
        self.remover.delete(records).await
    }
}
