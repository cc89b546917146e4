//! Downloading the remote images of a note into the repository.
//!
//! Every network image embedded in the note is fetched once, saved under a
//! folder of the repository and the note is rewritten to point at the local
//! copies. Responses that are not a recognised image are left remote.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::contract::{Document, Fetcher, RepoFile, Workspace};
use crate::error::DownloadError;
use crate::resolver::{is_image_path, is_network_path, relative_path};
use crate::rewrite::markdown_image;
use crate::scanner::{decode_path, scan, ImageReference};
use crate::settings::Settings;

/// Stem used when a URL carries no usable file name.
pub const FALLBACK_STEM: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    pub url: String,
    /// Repository path the image was saved to.
    pub file: RepoFile,
    /// Link written into the note, relative to the note's folder.
    pub link: String,
}

#[derive(Debug)]
pub struct DownloadFailure {
    pub url: String,
    pub error: DownloadError,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Distinct remote image URLs found in the note.
    pub total: usize,
    pub downloaded: Vec<DownloadedImage>,
    pub failed: Vec<DownloadFailure>,
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return write!(f, "No network images found");
        }
        write!(
            f,
            "all: {}\nsuccess: {}\nfailed: {}",
            self.total,
            self.downloaded.len(),
            self.failed.len()
        )
    }
}

/// File extension for image bytes, judged by content rather than by URL.
pub fn sniff_image_extension(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return format
            .extensions_str()
            .iter()
            .copied()
            .find(|ext| is_image_path(&format!("x.{ext}")));
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Some("svg");
    }
    None
}

/// File stem derived from the last path segment of `url`, safe for any filesystem.
pub fn file_stem_for_url(url: &str) -> String {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
    let segment = decode_path(path.rsplit('/').next().unwrap_or(path));
    let stem = match segment.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => segment.as_str(),
    };
    let cleaned: String = stem
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Percent-encode each segment of a relative link so it survives in markdown.
pub fn encode_link(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn join(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Remote image references of `text`, grouped by URL in order of first appearance.
fn remote_references(text: &str) -> Vec<(String, Vec<ImageReference>)> {
    let mut grouped: Vec<(String, Vec<ImageReference>)> = Vec::new();
    for reference in scan(text).filter(|r| is_network_path(&r.raw_path)) {
        match grouped.iter_mut().find(|(url, _)| *url == reference.link) {
            Some((_, refs)) => refs.push(reference),
            None => grouped.push((reference.link.clone(), vec![reference])),
        }
    }
    grouped
}

/// Download every remote image of the note into `folder` and relink the note.
///
/// A URL whose download fails keeps its remote embed. Name clashes inside one
/// run get a short random suffix; a clash with an existing file gets a random name.
pub async fn download_all_images<D, W, F>(
    document: &D,
    workspace: &W,
    fetcher: &F,
    settings: &Settings,
    folder: &str,
) -> DownloadReport
where
    D: Document + ?Sized,
    W: Workspace + ?Sized,
    F: Fetcher + ?Sized,
{
    let content = document.get_value();
    let remote = remote_references(&content);
    let mut report = DownloadReport {
        total: remote.len(),
        ..DownloadReport::default()
    };
    if remote.is_empty() {
        info!("No network images to download");
        return report;
    }

    let note_dir = workspace
        .active_file()
        .map(|f| f.parent_dir().to_string())
        .unwrap_or_default();
    let mut existing: HashSet<String> = workspace.files().into_iter().map(|f| f.path).collect();
    let mut stems: HashSet<String> = HashSet::new();
    let mut rewritten = content;

    for (url, references) in remote {
        let mut stem = file_stem_for_url(&url);
        if !stems.insert(stem.clone()) {
            stem = format!("{stem}-{}", short_id());
            stems.insert(stem.clone());
        }

        let result = async {
            let bytes = fetcher.fetch(&url).await.map_err(DownloadError::Fetch)?;
            let ext = sniff_image_extension(&bytes).ok_or(DownloadError::NotAnImage)?;
            let mut path = join(folder, &format!("{stem}.{ext}"));
            if existing.contains(&path) {
                path = join(folder, &format!("{}.{ext}", Uuid::new_v4().simple()));
            }
            let file = RepoFile::new(path);
            workspace
                .write_binary(&file, &bytes)
                .await
                .map_err(DownloadError::Write)?;
            Ok::<RepoFile, DownloadError>(file)
        }
        .await;

        match result {
            Ok(file) => {
                existing.insert(file.path.clone());
                let link = encode_link(&relative_path(&note_dir, &file.path));
                let embed = markdown_image(&stem, &link, settings);
                for reference in &references {
                    rewritten = rewritten.replace(&reference.snippet, &embed);
                }
                debug!(url = %url, file = %file.path, "Downloaded network image");
                report.downloaded.push(DownloadedImage { url, file, link });
            }
            Err(error) => {
                warn!(url = %url, error = %error, "Failed to download network image");
                report.failed.push(DownloadFailure { url, error });
            }
        }
    }

    if !report.downloaded.is_empty() {
        document.set_value(&rewritten);
    }
    info!(
        total = report.total,
        downloaded = report.downloaded.len(),
        failed = report.failed.len(),
        "Downloaded network images"
    );
    report
}
