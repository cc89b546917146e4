//! Clipboard paste and drag-and-drop uploads.
//!
//! While an upload is in flight the document holds a placeholder embed keyed by
//! a token unique to that operation; the placeholder is later swapped for the
//! final embed or for a failure marker.

use std::fmt;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::contract::{ClipboardFile, Document, Position, UploadItem, Uploader};
use crate::resolver::{is_network_path, ImageKind, ResolvedImage};
use crate::rewrite::{markdown_image, replace_images};
use crate::scanner::scan;
use crate::settings::Settings;

/// Front-matter key that overrides the auto-upload switch for one note.
pub const FRONT_MATTER_KEY: &str = "image-auto-upload";

pub const UPLOAD_FAILED_MARKER: &str = "⚠️upload failed, check dev console";

/// Identifies the placeholder of one paste or drop operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteToken(String);

impl PasteToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn placeholder(&self) -> String {
        format!("![Uploading file...{}]()", self.0)
    }
}

/// What the clipboard held at paste time.
#[derive(Debug, Clone, Default)]
pub struct ClipboardContent {
    pub files: Vec<ClipboardFile>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteOutcome {
    /// Auto upload is switched off for this note.
    Disabled,
    /// Nothing to upload; the host should handle the event normally.
    Skipped,
    Embedded { urls: Vec<String> },
    Failed { message: String },
}

impl fmt::Display for PasteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasteOutcome::Disabled => write!(f, "Auto upload is disabled for this note"),
            PasteOutcome::Skipped => write!(f, "Nothing to upload"),
            PasteOutcome::Embedded { urls } => write!(f, "Uploaded {} image(s)", urls.len()),
            PasteOutcome::Failed { message } => write!(f, "Upload error: {message}"),
        }
    }
}

fn front_matter(text: &str) -> Option<&str> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }
    None
}

/// Whether auto upload applies to a note, honouring its front-matter override.
pub fn allow_upload(text: &str, default: bool) -> bool {
    let Some(yaml) = front_matter(text) else {
        return default;
    };
    match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
        Ok(value) => value
            .get(FRONT_MATTER_KEY)
            .and_then(serde_yaml::Value::as_bool)
            .unwrap_or(default),
        Err(e) => {
            warn!(error = %e, "Ignoring unparsable front matter");
            default
        }
    }
}

/// True when the clipboard's first file is an image. Some applications put an
/// image next to text on the clipboard; `applyImage` decides those.
pub fn can_upload(clipboard: &ClipboardContent, settings: &Settings) -> bool {
    match clipboard.files.first() {
        Some(file) if file.is_image() => clipboard.text.is_empty() || settings.apply_image,
        _ => false,
    }
}

/// Replace the first occurrence of `target`, searching line by line.
pub fn replace_first_occurrence<D>(document: &D, target: &str, replacement: &str) -> bool
where
    D: Document + ?Sized,
{
    let content = document.get_value();
    for (line, text) in content.split('\n').enumerate() {
        if let Some(ch) = text.find(target) {
            document.replace_range(
                replacement,
                Position { line, ch },
                Position {
                    line,
                    ch: ch + target.len(),
                },
            );
            return true;
        }
    }
    false
}

fn insert_placeholder<D: Document + ?Sized>(document: &D, token: &PasteToken) {
    document.replace_selection(&format!("{}\n", token.placeholder()));
}

pub fn embed_markdown_image<D>(
    document: &D,
    token: &PasteToken,
    url: &str,
    name: &str,
    settings: &Settings,
) where
    D: Document + ?Sized,
{
    let image = markdown_image(name, url, settings);
    if !replace_first_occurrence(document, &token.placeholder(), &image) {
        warn!(token = token.as_str(), "Upload placeholder disappeared before the upload finished");
    }
}

pub fn handle_failed_upload<D>(document: &D, token: &PasteToken, reason: &str)
where
    D: Document + ?Sized,
{
    error!(reason = %reason, "Failed request");
    replace_first_occurrence(document, &token.placeholder(), UPLOAD_FAILED_MARKER);
}

/// Upload the clipboard's image and embed it at the cursor.
pub async fn upload_clipboard<D, U>(
    document: &D,
    uploader: &U,
    settings: &Settings,
    clipboard: &ClipboardContent,
) -> PasteOutcome
where
    D: Document + ?Sized,
    U: Uploader + ?Sized,
{
    if !allow_upload(&document.get_value(), settings.upload_by_clip_switch) {
        return PasteOutcome::Disabled;
    }
    if !can_upload(clipboard, settings) {
        return PasteOutcome::Skipped;
    }
    let name = clipboard
        .files
        .first()
        .map(|f| f.name.clone())
        .unwrap_or_default();

    let token = PasteToken::generate();
    insert_placeholder(document, &token);

    let message = match uploader.upload_clipboard(clipboard.files.clone()).await {
        Ok(res) if res.code == 0 => match res.data {
            Some(url) => {
                embed_markdown_image(document, &token, &url, &name, settings);
                info!(url = %url, "Embedded pasted image");
                return PasteOutcome::Embedded { urls: vec![url] };
            }
            None => "upload returned no URL".to_string(),
        },
        Ok(res) => res
            .message
            .unwrap_or_else(|| format!("upload failed with code {}", res.code)),
        Err(e) => e.to_string(),
    };
    handle_failed_upload(document, &token, &message);
    PasteOutcome::Failed { message }
}

/// Upload remote image links found in pasted text and point them at the hosted copies.
pub async fn upload_pasted_links<D, U>(
    document: &D,
    uploader: &U,
    settings: &Settings,
    pasted_text: &str,
) -> PasteOutcome
where
    D: Document + ?Sized,
    U: Uploader + ?Sized,
{
    if !allow_upload(&document.get_value(), settings.upload_by_clip_switch) {
        return PasteOutcome::Disabled;
    }
    if !settings.work_on_network {
        return PasteOutcome::Skipped;
    }
    let images: Vec<ResolvedImage> = scan(pasted_text)
        .filter(|r| is_network_path(&r.raw_path) && !settings.is_black_domain(&r.raw_path))
        .map(|reference| ResolvedImage {
            reference,
            kind: ImageKind::Remote,
        })
        .collect();
    if images.is_empty() {
        return PasteOutcome::Skipped;
    }

    let items = images
        .iter()
        .map(|i| UploadItem::Path(i.reference.link.clone()))
        .collect();
    match uploader.upload(items).await {
        Ok(res) if res.success => {
            let uploaded: Vec<(ResolvedImage, String)> =
                images.into_iter().zip(res.urls.iter().cloned()).collect();
            let content = replace_images(&document.get_value(), &uploaded, settings);
            document.set_value(&content);
            info!(count = uploaded.len(), "Uploaded pasted network images");
            PasteOutcome::Embedded { urls: res.urls }
        }
        Ok(res) => PasteOutcome::Failed {
            message: res.message.unwrap_or_else(|| "Upload error".to_string()),
        },
        Err(e) => PasteOutcome::Failed {
            message: e.to_string(),
        },
    }
}

/// Upload dropped image files by path and embed one image per returned URL.
pub async fn upload_dropped_files<D, U>(
    document: &D,
    uploader: &U,
    settings: &Settings,
    files: &[ClipboardFile],
) -> PasteOutcome
where
    D: Document + ?Sized,
    U: Uploader + ?Sized,
{
    if !allow_upload(&document.get_value(), settings.upload_by_clip_switch) {
        return PasteOutcome::Disabled;
    }
    let Some(first) = files.first().filter(|f| f.is_image()) else {
        return PasteOutcome::Skipped;
    };
    let items: Vec<UploadItem> = files
        .iter()
        .filter_map(|f| f.path.clone())
        .map(UploadItem::Path)
        .collect();
    if items.is_empty() {
        return PasteOutcome::Skipped;
    }

    match uploader.upload(items).await {
        Ok(res) if res.success => {
            for url in &res.urls {
                let token = PasteToken::generate();
                insert_placeholder(document, &token);
                embed_markdown_image(document, &token, url, &first.name, settings);
            }
            PasteOutcome::Embedded { urls: res.urls }
        }
        Ok(res) => {
            error!(message = ?res.message, "Upload error");
            PasteOutcome::Failed {
                message: res.message.unwrap_or_else(|| "Upload error".to_string()),
            }
        }
        Err(e) => {
            error!(error = %e, "Upload error");
            PasteOutcome::Failed {
                message: e.to_string(),
            }
        }
    }
}
