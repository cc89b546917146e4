//! Mapping image references onto repository files or remote URLs.
//!
//! Strategies, first match wins:
//!
//! 1. network URL → remote (only with network upload on and not blacklisted)
//! 2. exact full path
//! 3. `./` or `../` path relative to the active note's directory
//! 4. basename
//!
//! A local candidate must also carry an image extension.

use std::collections::HashMap;

use tracing::debug;

use crate::contract::RepoFile;
use crate::scanner::{basename, ImageReference};
use crate::settings::Settings;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "gif", "svg", "tiff", "webp", "avif",
];

pub fn is_image_path(path: &str) -> bool {
    RepoFile::new(path)
        .extension()
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_network_path(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Full-path and basename lookups over every file of the repository.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    by_path: HashMap<String, RepoFile>,
    by_name: HashMap<String, RepoFile>,
}

impl FileIndex {
    /// Later files overwrite earlier ones that share a basename, so the basename
    /// lookup returns the file enumerated last.
    pub fn build(files: impl IntoIterator<Item = RepoFile>) -> Self {
        let mut index = FileIndex::default();
        for file in files {
            index.by_name.insert(file.name.clone(), file.clone());
            index.by_path.insert(file.path.clone(), file);
        }
        index
    }

    pub fn by_path(&self, path: &str) -> Option<&RepoFile> {
        self.by_path.get(path)
    }

    pub fn by_name(&self, name: &str) -> Option<&RepoFile> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    NotFound,
    NotAnImage,
    NetworkDisabled,
    Blacklisted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageKind {
    Local(RepoFile),
    Remote,
    Unresolved(UnresolvedReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub reference: ImageReference,
    pub kind: ImageKind,
}

impl ResolvedImage {
    pub fn is_uploadable(&self) -> bool {
        !matches!(self.kind, ImageKind::Unresolved(_))
    }

    pub fn local_file(&self) -> Option<&RepoFile> {
        match &self.kind {
            ImageKind::Local(file) => Some(file),
            _ => None,
        }
    }

    /// Name shown in progress notifications.
    pub fn progress_name(&self) -> &str {
        if self.reference.display_name.is_empty() {
            &self.reference.raw_path
        } else {
            &self.reference.display_name
        }
    }
}

/// Everything resolution depends on besides the reference itself.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub index: &'a FileIndex,
    /// Directory of the active note, `/`-separated; `None` disables relative lookup.
    pub active_dir: Option<&'a str>,
    pub settings: &'a Settings,
}

pub fn resolve(reference: &ImageReference, ctx: &ResolveContext<'_>) -> ImageKind {
    let path = reference.raw_path.as_str();

    if is_network_path(path) {
        if !ctx.settings.work_on_network {
            return ImageKind::Unresolved(UnresolvedReason::NetworkDisabled);
        }
        if ctx.settings.is_black_domain(path) {
            debug!(path = %path, "Remote image excluded by blacklist");
            return ImageKind::Unresolved(UnresolvedReason::Blacklisted);
        }
        return ImageKind::Remote;
    }

    let candidate = ctx
        .index
        .by_path(path)
        .or_else(|| {
            if !(path.starts_with("./") || path.starts_with("../")) {
                return None;
            }
            let dir = ctx.active_dir?;
            ctx.index.by_path(&resolve_relative(dir, path))
        })
        .or_else(|| ctx.index.by_name(basename(path)));

    match candidate {
        Some(file) if is_image_path(&file.path) => ImageKind::Local(file.clone()),
        Some(file) => {
            debug!(path = %file.path, "Referenced file is not an image");
            ImageKind::Unresolved(UnresolvedReason::NotAnImage)
        }
        None => ImageKind::Unresolved(UnresolvedReason::NotFound),
    }
}

/// Resolve every reference and keep only the uploadable ones, in order.
pub fn resolve_batch(
    references: impl IntoIterator<Item = ImageReference>,
    ctx: &ResolveContext<'_>,
) -> Vec<ResolvedImage> {
    references
        .into_iter()
        .filter_map(|reference| {
            let kind = resolve(&reference, ctx);
            match kind {
                ImageKind::Unresolved(reason) => {
                    debug!(
                        path = %reference.raw_path,
                        ?reason,
                        "Dropping unresolved image reference"
                    );
                    None
                }
                kind => Some(ResolvedImage { reference, kind }),
            }
        })
        .collect()
}

/// Join `relative` onto `dir` and normalise `.` and `..` segments.
///
/// `..` above the repository root is dropped.
pub fn resolve_relative(dir: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            part => segments.push(part),
        }
    }
    segments.join("/")
}

/// Path of `target` as seen from the directory `dir`; both are repository-relative.
pub fn relative_path(dir: &str, target: &str) -> String {
    let from: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
    let common = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();
    let mut segments = vec![".."; from.len() - common];
    segments.extend(&to[common..]);
    segments.join("/")
}
