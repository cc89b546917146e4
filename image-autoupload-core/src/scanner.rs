//! Image reference scanning.
//!
//! Two embed syntaxes are recognised in a single left-to-right pass:
//!
//! - `![[target]]` / `![[target|caption]]`
//! - `![alt](path)`, `![alt](path "title")`, `![alt](<path with spaces>)`
//!
//! Because both alternatives live in one regex, matches come out in document
//! order and never overlap.

use std::sync::OnceLock;

use regex::{Captures, Regex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSyntax {
    /// `![[target|caption]]`
    Wiki,
    /// `![alt](path "title")`
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Path with percent-encoding decoded.
    pub raw_path: String,
    /// The path exactly as written in the document.
    pub link: String,
    pub display_name: String,
    /// The exact matched text; replacements look for this verbatim.
    pub snippet: String,
    pub syntax: ReferenceSyntax,
    /// Wiki target or markdown alt text, untrimmed.
    pub alt: String,
    /// Wiki pipe caption or markdown quoted title.
    pub caption: Option<String>,
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?x)
            !\[\[ (?P<wiki>[^\]|]+?) (?:\s*\|(?P<caption>[^\]]*))? \]\]
            |
            !\[ (?P<angle_alt>[^\]]*) \]\( < (?P<angle_path>[^>]+) > (?:\s+"(?P<angle_title>[^"]*)")? \s*\)
            |
            !\[ (?P<alt>[^\]]*) \]\( (?P<path>[^\s)]+) (?:\s+"(?P<title>[^"]*)")? \s*\)
            "#,
        )
        .expect("reference regex is valid")
    })
}

/// Lazily scan `text` for image references, in document order.
///
/// The iterator is `Clone`; cloning it (or calling `scan` again) restarts from
/// the same position.
pub fn scan(text: &str) -> ImageReferences<'_> {
    ImageReferences { text, pos: 0 }
}

#[derive(Debug, Clone)]
pub struct ImageReferences<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> Iterator for ImageReferences<'t> {
    type Item = ImageReference;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos > self.text.len() {
            return None;
        }
        let caps = reference_regex().captures_at(self.text, self.pos)?;
        let whole = caps.get(0)?;
        self.pos = whole.end().max(whole.start() + 1);
        Some(reference_from(&caps, whole.as_str()))
    }
}

fn reference_from(caps: &Captures<'_>, snippet: &str) -> ImageReference {
    let text = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

    if let Some(target) = text("wiki") {
        let raw_path = decode_path(&target);
        let display_name = basename(&raw_path).to_string();
        return ImageReference {
            raw_path,
            link: target.clone(),
            display_name,
            snippet: snippet.to_string(),
            syntax: ReferenceSyntax::Wiki,
            alt: target,
            caption: text("caption"),
        };
    }

    let (alt, link, title) = match text("angle_path") {
        Some(path) => (
            text("angle_alt").unwrap_or_default(),
            path,
            text("angle_title"),
        ),
        None => (
            text("alt").unwrap_or_default(),
            text("path").unwrap_or_default(),
            text("title"),
        ),
    };
    ImageReference {
        raw_path: decode_path(&link),
        link,
        display_name: alt.clone(),
        snippet: snippet.to_string(),
        syntax: ReferenceSyntax::Markdown,
        alt,
        caption: title,
    }
}

/// Percent-decode a path; text that is not valid encoding is kept as written.
pub fn decode_path(path: &str) -> String {
    match urlencoding::decode(path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => path.to_string(),
    }
}

pub(crate) fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
