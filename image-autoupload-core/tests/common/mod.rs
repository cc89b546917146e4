#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use image_autoupload_core::contract::{
    Document, MockDeleter, MockSettingsStore, Position, RepoFile, Workspace,
};
use image_autoupload_core::error::HostError;

/// Text buffer with a cursor at the end and an optional selection.
pub struct MemoryDocument {
    content: Mutex<String>,
    selection: Mutex<Option<String>>,
}

impl MemoryDocument {
    pub fn new(content: &str) -> Self {
        Self {
            content: Mutex::new(content.to_string()),
            selection: Mutex::new(None),
        }
    }

    pub fn select(&self, text: &str) {
        *self.selection.lock().unwrap() = Some(text.to_string());
    }

    pub fn text(&self) -> String {
        self.content.lock().unwrap().clone()
    }
}

fn offset(content: &str, pos: Position) -> usize {
    let line_start: usize = content
        .split_inclusive('\n')
        .take(pos.line)
        .map(str::len)
        .sum();
    line_start + pos.ch
}

impl Document for MemoryDocument {
    fn get_value(&self) -> String {
        self.text()
    }

    fn set_value(&self, content: &str) {
        *self.content.lock().unwrap() = content.to_string();
    }

    fn replace_range(&self, replacement: &str, from: Position, to: Position) {
        let mut content = self.content.lock().unwrap();
        let (start, end) = (offset(&content, from), offset(&content, to));
        content.replace_range(start..end, replacement);
    }

    fn selection(&self) -> Option<String> {
        self.selection.lock().unwrap().clone()
    }

    fn replace_selection(&self, replacement: &str) {
        let mut content = self.content.lock().unwrap();
        match self.selection.lock().unwrap().take() {
            Some(selected) => *content = content.replacen(&selected, replacement, 1),
            None => content.push_str(replacement),
        }
    }
}

/// Repository held in memory; the active note can be switched mid-flow.
pub struct MemoryWorkspace {
    files: Vec<RepoFile>,
    contents: HashMap<String, Vec<u8>>,
    active: Mutex<Option<RepoFile>>,
    pub reads: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryWorkspace {
    pub fn new(active: &str) -> Self {
        Self {
            files: vec![RepoFile::new(active)],
            contents: HashMap::new(),
            active: Mutex::new(Some(RepoFile::new(active))),
            reads: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_file(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.push(RepoFile::new(path));
        self.contents.insert(path.to_string(), bytes.to_vec());
        self
    }

    pub fn set_active(&self, path: &str) {
        *self.active.lock().unwrap() = Some(RepoFile::new(path));
    }
}

#[async_trait]
impl Workspace for MemoryWorkspace {
    fn files(&self) -> Vec<RepoFile> {
        self.files.clone()
    }

    fn active_file(&self) -> Option<RepoFile> {
        self.active.lock().unwrap().clone()
    }

    async fn read_binary(&self, file: &RepoFile) -> Result<Vec<u8>, HostError> {
        self.reads.lock().unwrap().push(file.path.clone());
        self.contents
            .get(&file.path)
            .cloned()
            .ok_or_else(|| HostError::NotFound(file.path.clone()))
    }

    async fn write_binary(&self, file: &RepoFile, bytes: &[u8]) -> Result<(), HostError> {
        self.writes
            .lock()
            .unwrap()
            .push((file.path.clone(), bytes.to_vec()));
        Ok(())
    }
}

/// A settings store that accepts any number of saves.
pub fn lenient_store() -> MockSettingsStore {
    let mut store = MockSettingsStore::new();
    store.expect_save().returning(|_| Ok(()));
    store
}

/// A deleter that must never be called.
pub fn unused_deleter() -> MockDeleter {
    let mut deleter = MockDeleter::new();
    deleter.expect_trash_file().never();
    deleter.expect_delete_uploaded().never();
    deleter
}
