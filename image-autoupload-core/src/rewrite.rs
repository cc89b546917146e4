//! Rendering uploaded images back into the document.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::contract::{Deleter, Document};
use crate::resolver::{ImageKind, ResolvedImage};
use crate::scanner::{ImageReference, ReferenceSyntax};
use crate::settings::{CaptionMode, ImageDesc, ImageFormat, Settings};

/// Name the editor gives to pasted screenshots.
pub const DEFAULT_CAPTURE_NAME: &str = "image.png";

/// Apply the name policy to a plain markdown embed's display name.
pub fn handle_name(name: &str, settings: &Settings) -> String {
    let suffix = settings.image_size_suffix.as_str();
    match settings.image_desc {
        ImageDesc::Origin => format!("{name}{suffix}"),
        ImageDesc::None => String::new(),
        ImageDesc::RemoveDefault if name == DEFAULT_CAPTURE_NAME => String::new(),
        ImageDesc::RemoveDefault => format!("{name}{suffix}"),
    }
}

pub fn markdown_image(name: &str, url: &str, settings: &Settings) -> String {
    format!("![{}]({})", handle_name(name, settings), url)
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 && !name[idx + 1..].contains('/') => &name[..idx],
        _ => name,
    }
}

/// Explicit caption carried by the reference: wiki pipe caption or markdown title.
pub fn extract_caption(reference: &ImageReference) -> Option<String> {
    reference
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

pub fn figure_caption(reference: &ImageReference, settings: &Settings) -> Option<String> {
    extract_caption(reference).or_else(|| match settings.figure_caption_mode {
        CaptionMode::Always if !reference.display_name.is_empty() => {
            Some(strip_extension(&reference.display_name).to_string())
        }
        _ => None,
    })
}

pub fn figure_alt(reference: &ImageReference) -> String {
    let alt = match reference.syntax {
        ReferenceSyntax::Wiki => strip_extension(&reference.alt).trim(),
        ReferenceSyntax::Markdown => reference.alt.trim(),
    };
    if alt.is_empty() {
        strip_extension(&reference.display_name).to_string()
    } else {
        alt.to_string()
    }
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

pub fn figure_image(reference: &ImageReference, url: &str, settings: &Settings) -> String {
    let figure_style = format!("text-align:{};", settings.figure_align.as_css());
    let alt = escape_attribute(&figure_alt(reference));

    let caption_styles: Vec<String> = [
        ("margin-top", &settings.figure_caption_margin_top),
        ("font-size", &settings.figure_caption_font_size),
        ("color", &settings.figure_caption_color),
    ]
    .iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(prop, value)| format!("{prop}:{value}"))
    .collect();
    let caption_style = if caption_styles.is_empty() {
        String::new()
    } else {
        format!(" style=\"{};\"", caption_styles.join(";"))
    };

    match figure_caption(reference, settings) {
        Some(caption) => format!(
            "<figure style=\"{figure_style}\">\n  <img src=\"{url}\" alt=\"{alt}\">\n  <figcaption{caption_style}>{caption}</figcaption>\n</figure>"
        ),
        None => format!(
            "<figure style=\"{figure_style}\">\n  <img src=\"{url}\" alt=\"{alt}\">\n</figure>"
        ),
    }
}

/// Final rendering of one uploaded reference under the configured output mode.
pub fn render(reference: &ImageReference, url: &str, settings: &Settings) -> String {
    match settings.image_format {
        ImageFormat::Markdown => markdown_image(&reference.display_name, url, settings),
        ImageFormat::Figure => figure_image(reference, url, settings),
    }
}

/// Replace every occurrence of each image's snippet with its rendering.
pub fn replace_images(
    content: &str,
    uploaded: &[(ResolvedImage, String)],
    settings: &Settings,
) -> String {
    uploaded
        .iter()
        .fold(content.to_string(), |content, (image, url)| {
            let replacement = render(&image.reference, url, settings);
            content.replace(&image.reference.snippet, &replacement)
        })
}

/// Rewrite the document and, when configured, trash the uploaded local sources.
pub async fn apply_rewrites<D, X>(
    document: &D,
    deleter: &X,
    uploaded: &[(ResolvedImage, String)],
    settings: &Settings,
) where
    D: Document + ?Sized,
    X: Deleter + ?Sized,
{
    let content = replace_images(&document.get_value(), uploaded, settings);
    document.set_value(&content);
    info!(count = uploaded.len(), "Rewrote uploaded image references");

    if !settings.delete_source {
        return;
    }
    let mut trashed = HashSet::new();
    for (image, _) in uploaded {
        if let ImageKind::Local(file) = &image.kind {
            if !trashed.insert(file.path.as_str()) {
                continue;
            }
            match deleter.trash_file(file).await {
                Ok(()) => info!(file = %file.path, "Moved uploaded source to trash"),
                Err(e) => warn!(file = %file.path, error = ?e, "Failed to trash uploaded source"),
            }
        }
    }
}
