//! Deleting previously uploaded images from the image host.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{error, info};

use crate::contract::Host;
use crate::resolver::is_network_path;
use crate::scanner::scan;
use crate::settings::{Settings, UploadedImage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    NoUploadedImages,
    Deleted { count: usize },
    DeleteFailed { message: Option<String> },
    Error { message: String },
}

impl fmt::Display for RemovalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalOutcome::NoUploadedImages => write!(f, "No uploaded images found"),
            RemovalOutcome::Deleted { count } => write!(f, "Deleted {count} image(s) successfully"),
            RemovalOutcome::DeleteFailed { message: Some(m) } => write!(f, "Delete failed: {m}"),
            RemovalOutcome::DeleteFailed { message: None } => write!(f, "Delete failed"),
            RemovalOutcome::Error { message } => write!(f, "Error, could not delete: {message}"),
        }
    }
}

fn registry_record<'s>(settings: &'s Settings, url: &str) -> Option<&'s UploadedImage> {
    settings.uploaded_images.iter().find(|r| r.img_url == url)
}

/// Delete every registered uploaded image referenced by the active note and
/// remove those references from it.
pub async fn delete_all_images(settings: &mut Settings, host: &Host<'_>) -> RemovalOutcome {
    let content = host.document.get_value();
    let in_note: Vec<_> = scan(&content)
        .filter(|r| is_network_path(&r.raw_path) && registry_record(settings, &r.link).is_some())
        .collect();
    if in_note.is_empty() {
        return RemovalOutcome::NoUploadedImages;
    }

    let mut to_delete: BTreeMap<String, UploadedImage> = BTreeMap::new();
    for reference in &in_note {
        if let Some(record) = registry_record(settings, &reference.link) {
            to_delete.insert(record.img_url.clone(), record.clone());
        }
    }

    let records: Vec<UploadedImage> = to_delete.values().cloned().collect();
    match host.deleter.delete_uploaded(records).await {
        Ok(res) if res.success => {
            settings
                .uploaded_images
                .retain(|r| !to_delete.contains_key(&r.img_url));
            if let Err(e) = host.store.save(settings).await {
                error!(error = ?e, "Failed to persist settings after deletion");
            }
            let content = in_note
                .iter()
                .fold(host.document.get_value(), |content, reference| {
                    content.replacen(&reference.snippet, "", 1)
                });
            host.document.set_value(&content);
            info!(count = to_delete.len(), "Deleted uploaded images");
            RemovalOutcome::Deleted {
                count: to_delete.len(),
            }
        }
        Ok(res) => RemovalOutcome::DeleteFailed {
            message: res.message,
        },
        Err(e) => {
            error!(error = ?e, "Could not delete uploaded images");
            RemovalOutcome::Error {
                message: e.to_string(),
            }
        }
    }
}

fn selection_image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[.*\]\((.*)\)").expect("selection regex is valid"))
}

/// The uploaded image URL inside the current selection, if it is registered.
pub fn selected_uploaded_image(selection: &str, settings: &Settings) -> Option<String> {
    let url = selection_image_regex().captures(selection)?.get(1)?.as_str();
    registry_record(settings, url).map(|r| r.img_url.clone())
}

/// Delete the uploaded image in the selection and clear the selection.
pub async fn delete_selected_image(settings: &mut Settings, host: &Host<'_>) -> RemovalOutcome {
    let Some(selection) = host.document.selection() else {
        return RemovalOutcome::NoUploadedImages;
    };
    let Some(url) = selected_uploaded_image(&selection, settings) else {
        return RemovalOutcome::NoUploadedImages;
    };
    let records: Vec<UploadedImage> = registry_record(settings, &url)
        .cloned()
        .into_iter()
        .collect();

    match host.deleter.delete_uploaded(records).await {
        Ok(res) if res.success => {
            host.document.replace_selection("");
            settings.uploaded_images.retain(|r| r.img_url != url);
            if let Err(e) = host.store.save(settings).await {
                error!(error = ?e, "Failed to persist settings after deletion");
            }
            RemovalOutcome::Deleted { count: 1 }
        }
        Ok(res) => RemovalOutcome::DeleteFailed {
            message: res.message,
        },
        Err(e) => RemovalOutcome::Error {
            message: e.to_string(),
        },
    }
}
