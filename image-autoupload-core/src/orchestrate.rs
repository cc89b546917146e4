//! Upload orchestration: scan → resolve → upload → rewrite for the active note.
//!
//! Uploads run strictly one at a time. The progress callback fires once per
//! item, in order, right before that item's upload is awaited, so progress is
//! monotonic no matter how long each upload takes.
//!
//! # Caching
//! With caching enabled, local files are hashed first and a cache hit skips
//! the uploader entirely. Every successful upload writes the cache and is
//! persisted through the [`SettingsStore`](crate::contract::SettingsStore)
//! immediately, not at batch end.
//!
//! # Failure model
//! A failed item is recorded and the batch moves on. The batch succeeds when
//! at least one item produced a URL. If the active note changed while
//! uploading, nothing is rewritten and [`BatchOutcome::DocumentChanged`] is
//! reported instead.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::cache::content_hash;
use crate::contract::{Host, RepoFile, UploadItem, UploadResponse};
use crate::error::UploadError;
use crate::resolver::{
    is_image_path, resolve_batch, FileIndex, ImageKind, ResolveContext, ResolvedImage,
};
use crate::rewrite::apply_rewrites;
use crate::scanner::{basename, scan};
use crate::settings::Settings;

/// Result for one item of a batch.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub image: ResolvedImage,
    pub url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// At least one item produced a URL.
    pub success: bool,
    pub outcomes: Vec<UploadOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.url.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Successfully uploaded images paired with their URLs, in batch order.
    pub fn uploaded(&self) -> Vec<(ResolvedImage, String)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.url.clone().map(|url| (o.image.clone(), url)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing in the note resolved to an uploadable image.
    NoImages,
    AllFailed { failed: usize },
    /// Uploads went through but the active note changed; nothing was rewritten.
    DocumentChanged { succeeded: usize, failed: usize },
    Uploaded { succeeded: usize, failed: usize },
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::NoImages => write!(f, "Can not find image file"),
            BatchOutcome::AllFailed { failed } => {
                write!(f, "Upload failed: none of {failed} image(s) could be uploaded")
            }
            BatchOutcome::DocumentChanged { .. } => {
                write!(f, "File has been changed, upload failure")
            }
            BatchOutcome::Uploaded { succeeded, failed: 0 } => {
                write!(f, "Uploaded {succeeded} image(s) successfully")
            }
            BatchOutcome::Uploaded { succeeded, failed } => {
                write!(f, "Upload partially succeeded: {succeeded} uploaded, {failed} failed")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadAllReport {
    pub outcome: BatchOutcome,
    pub batch: BatchReport,
}

fn upload_item(image: &ResolvedImage) -> UploadItem {
    match &image.kind {
        ImageKind::Local(file) => UploadItem::File {
            file: file.clone(),
            name: image.reference.display_name.clone(),
        },
        _ => UploadItem::Path(image.reference.link.clone()),
    }
}

async fn persist(settings: &Settings, host: &Host<'_>) {
    if let Err(e) = host.store.save(settings).await {
        error!(error = ?e, "Failed to persist settings");
    }
}

fn first_url(response: UploadResponse) -> Result<(String, UploadResponse), UploadError> {
    if !response.success {
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| "Upload failed".to_string());
        return Err(UploadError::Rejected(message));
    }
    let url = match response.urls.first() {
        Some(url) => url.clone(),
        None => {
            let message = response
                .message
                .clone()
                .unwrap_or_else(|| "Upload returned no URL".to_string());
            return Err(UploadError::Rejected(message));
        }
    };
    Ok((url, response))
}

/// Upload one image, consulting and updating the cache for local files.
pub async fn upload_single(
    image: &ResolvedImage,
    settings: &mut Settings,
    host: &Host<'_>,
) -> Result<String, UploadError> {
    let mut hash = None;
    if settings.enable_cache {
        if let ImageKind::Local(file) = &image.kind {
            let bytes = host.workspace.read_binary(file).await?;
            let digest = content_hash(&bytes);
            if let Some(url) = settings.image_cache.get(&digest) {
                debug!(file = %file.path, hash = %digest, "Image cache hit");
                return Ok(url.to_string());
            }
            debug!(file = %file.path, hash = %digest, "Image cache miss");
            hash = Some(digest);
        }
    }

    let response = host.uploader.upload(vec![upload_item(image)]).await?;
    let (url, response) = first_url(response)?;

    if let Some(digest) = hash {
        settings.image_cache.insert(digest, url.clone());
    }
    settings.uploaded_images.extend(response.records);
    persist(settings, host).await;
    Ok(url)
}

/// Upload `images` one by one, calling `on_progress(current, total, name)` before each.
pub async fn upload_with_progress<F>(
    images: Vec<ResolvedImage>,
    settings: &mut Settings,
    host: &Host<'_>,
    mut on_progress: F,
) -> BatchReport
where
    F: FnMut(usize, usize, &str),
{
    let total = images.len();
    let mut outcomes = Vec::with_capacity(total);

    for (idx, image) in images.into_iter().enumerate() {
        on_progress(idx + 1, total, image.progress_name());
        match upload_single(&image, settings, host).await {
            Ok(url) => {
                info!(image = %image.progress_name(), url = %url, "Uploaded image");
                outcomes.push(UploadOutcome {
                    image,
                    url: Some(url),
                    error: None,
                });
            }
            Err(e) => {
                warn!(image = %image.progress_name(), error = %e, "Image upload failed");
                outcomes.push(UploadOutcome {
                    image,
                    url: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    BatchReport {
        success: outcomes.iter().any(|o| o.url.is_some()),
        outcomes,
    }
}

/// Resolve every image reference of the active note against the workspace.
pub fn resolve_document_images(settings: &Settings, host: &Host<'_>) -> Vec<ResolvedImage> {
    let active = host.workspace.active_file();
    let index = FileIndex::build(host.workspace.files());
    let ctx = ResolveContext {
        index: &index,
        active_dir: active.as_ref().map(RepoFile::parent_dir),
        settings,
    };
    let content = host.document.get_value();
    resolve_batch(scan(&content), &ctx)
}

/// Upload every resolvable image of the active note and rewrite the note.
pub async fn upload_all_images<F>(
    settings: &mut Settings,
    host: &Host<'_>,
    on_progress: F,
) -> UploadAllReport
where
    F: FnMut(usize, usize, &str),
{
    let started_on = host.workspace.active_file();
    let images = resolve_document_images(settings, host);

    if images.is_empty() {
        info!("No uploadable images in the active note");
        return UploadAllReport {
            outcome: BatchOutcome::NoImages,
            batch: BatchReport::default(),
        };
    }
    info!(count = images.len(), "Upload start");

    let batch = upload_with_progress(images, settings, host, on_progress).await;
    let (succeeded, failed) = (batch.succeeded(), batch.failed());

    if !batch.success {
        error!(failed, "All image uploads failed");
        return UploadAllReport {
            outcome: BatchOutcome::AllFailed { failed },
            batch,
        };
    }

    let finished_on = host.workspace.active_file();
    if started_on.as_ref().map(|f| &f.path) != finished_on.as_ref().map(|f| &f.path) {
        warn!(
            started = ?started_on.map(|f| f.path),
            finished = ?finished_on.map(|f| f.path),
            "Active note changed during upload, discarding rewrites"
        );
        return UploadAllReport {
            outcome: BatchOutcome::DocumentChanged { succeeded, failed },
            batch,
        };
    }

    apply_rewrites(host.document, host.deleter, &batch.uploaded(), settings).await;
    UploadAllReport {
        outcome: BatchOutcome::Uploaded { succeeded, failed },
        batch,
    }
}

/// Upload one repository image and rewrite every reference to it in the active note.
///
/// All matching references go to the uploader in a single call.
pub async fn upload_file_references(
    file: &RepoFile,
    settings: &mut Settings,
    host: &Host<'_>,
) -> BatchOutcome {
    if !is_image_path(&file.path) {
        return BatchOutcome::NoImages;
    }
    let content = host.document.get_value();
    let images: Vec<ResolvedImage> = scan(&content)
        .filter(|r| basename(&r.raw_path) == file.name)
        .map(|reference| ResolvedImage {
            reference,
            kind: ImageKind::Local(file.clone()),
        })
        .collect();

    if images.is_empty() {
        info!(file = %file.path, "Active note does not reference the file");
        return BatchOutcome::NoImages;
    }

    let items = images.iter().map(upload_item).collect();
    let response = match host.uploader.upload(items).await {
        Ok(response) if response.success => response,
        Ok(response) => {
            error!(file = %file.path, message = ?response.message, "Upload error");
            return BatchOutcome::AllFailed {
                failed: images.len(),
            };
        }
        Err(e) => {
            error!(file = %file.path, error = %e, "Upload error");
            return BatchOutcome::AllFailed {
                failed: images.len(),
            };
        }
    };

    let total = images.len();
    let uploaded: Vec<(ResolvedImage, String)> =
        images.into_iter().zip(response.urls).collect();
    if !response.records.is_empty() {
        settings.uploaded_images.extend(response.records);
        persist(settings, host).await;
    }
    apply_rewrites(host.document, host.deleter, &uploaded, settings).await;

    BatchOutcome::Uploaded {
        succeeded: uploaded.len(),
        failed: total - uploaded.len(),
    }
}
