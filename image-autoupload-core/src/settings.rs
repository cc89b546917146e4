//! Typed persisted settings.
//!
//! The on-disk shape is the camelCase JSON object the editor plugin has always
//! written, so existing settings files load unchanged. Every field has a
//! default; unknown keys are ignored. Link replacement profiles stay a JSON
//! string at this edge and are parsed on demand by
//! [`Settings::link_replacement_profiles`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::ImageCache;
use crate::error::ConfigError;
use crate::link_replacement::{parse_profiles, LinkReplacementProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploaderKind {
    #[serde(rename = "PicGo")]
    PicGo,
    #[serde(rename = "PicGo-Core")]
    PicGoCore,
}

/// How the display name of a plain markdown embed is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageDesc {
    /// Keep the name, append the size suffix.
    Origin,
    /// Drop the name entirely.
    None,
    /// Drop the name only when it is the default capture name.
    RemoveDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageFormat {
    Markdown,
    Figure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FigureAlign {
    Center,
    Left,
    Right,
}

impl FigureAlign {
    pub fn as_css(&self) -> &'static str {
        match self {
            FigureAlign::Center => "center",
            FigureAlign::Left => "left",
            FigureAlign::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptionMode {
    /// Fall back to the file name when no explicit caption exists.
    Always,
    /// Emit a caption only when the reference carries one.
    CaptionOnly,
}

/// A record of an image uploaded through the image host, kept for deletion.
///
/// Only `imgUrl` is interpreted; everything else the host returned is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImage {
    #[serde(rename = "imgUrl")]
    pub img_url: String,
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

impl UploadedImage {
    pub fn new(img_url: impl Into<String>) -> Self {
        Self {
            img_url: img_url.into(),
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub upload_by_clip_switch: bool,
    pub uploader: UploaderKind,
    pub upload_server: String,
    pub delete_server: String,
    pub image_size_suffix: String,
    pub picgo_core_path: String,
    #[serde(rename = "workOnNetWork")]
    pub work_on_network: bool,
    /// Comma or newline separated substrings; matching remote links are never uploaded.
    #[serde(rename = "newWorkBlackDomains")]
    pub network_black_domains: String,
    pub apply_image: bool,
    pub delete_source: bool,
    pub image_desc: ImageDesc,
    pub image_format: ImageFormat,
    pub figure_align: FigureAlign,
    pub figure_caption_mode: CaptionMode,
    pub figure_caption_margin_top: String,
    pub figure_caption_font_size: String,
    pub figure_caption_color: String,
    pub remote_server_mode: bool,
    pub enable_cache: bool,
    pub image_cache: ImageCache,
    /// Serialized `Vec<LinkReplacementProfile>`.
    pub link_replacement_config: String,
    pub uploaded_images: Vec<UploadedImage>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_by_clip_switch: true,
            uploader: UploaderKind::PicGo,
            upload_server: "http://127.0.0.1:36677/upload".to_string(),
            delete_server: "http://127.0.0.1:36677/delete".to_string(),
            image_size_suffix: String::new(),
            picgo_core_path: String::new(),
            work_on_network: false,
            network_black_domains: String::new(),
            apply_image: true,
            delete_source: false,
            image_desc: ImageDesc::Origin,
            image_format: ImageFormat::Markdown,
            figure_align: FigureAlign::Center,
            figure_caption_mode: CaptionMode::CaptionOnly,
            figure_caption_margin_top: "0.5rem".to_string(),
            figure_caption_font_size: String::new(),
            figure_caption_color: String::new(),
            remote_server_mode: false,
            enable_cache: false,
            image_cache: ImageCache::default(),
            link_replacement_config: "[]".to_string(),
            uploaded_images: Vec::new(),
        }
    }
}

impl Settings {
    /// Build settings from persisted data, migrating legacy shapes first.
    ///
    /// `null` (nothing persisted yet) yields the defaults.
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            info!("No persisted settings, using defaults");
            return Ok(Self::default());
        }
        let mut migrated = migrate_legacy(value);
        if let Some(obj) = migrated.as_object_mut() {
            drop_unknown_variant::<UploaderKind>(obj, "uploader");
            drop_unknown_variant::<ImageDesc>(obj, "imageDesc");
            drop_unknown_variant::<ImageFormat>(obj, "imageFormat");
            drop_unknown_variant::<FigureAlign>(obj, "figureAlign");
            drop_unknown_variant::<CaptionMode>(obj, "figureCaptionMode");
        }
        let settings: Settings =
            serde_json::from_value(migrated).map_err(ConfigError::InvalidSettings)?;
        debug!(
            cache_entries = settings.image_cache.len(),
            uploaded_images = settings.uploaded_images.len(),
            "Settings loaded"
        );
        Ok(settings)
    }

    pub fn to_json(&self) -> Value {
        // Every field serializes to plain JSON, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse the link replacement profile set. An empty field counts as no profiles.
    pub fn link_replacement_profiles(&self) -> Result<Vec<LinkReplacementProfile>, ConfigError> {
        parse_profiles(&self.link_replacement_config)
    }

    pub fn set_link_replacement_profiles(&mut self, profiles: &[LinkReplacementProfile]) {
        self.link_replacement_config =
            serde_json::to_string_pretty(profiles).unwrap_or_else(|_| "[]".to_string());
    }

    /// Blacklist entries, trimmed, empty entries dropped.
    pub fn black_domains(&self) -> Vec<String> {
        self.network_black_domains
            .split(|c: char| c == ',' || c == '\n')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// True when any blacklist entry occurs in `link`, case-insensitively.
    pub fn is_black_domain(&self, link: &str) -> bool {
        let link = link.to_lowercase();
        self.black_domains()
            .iter()
            .any(|domain| link.contains(&domain.to_lowercase()))
    }

    /// Remote server mode uploads file contents, so it cannot fetch network images.
    pub fn set_remote_server_mode(&mut self, enabled: bool) {
        self.remote_server_mode = enabled;
        if enabled {
            self.work_on_network = false;
        }
    }

    /// Returns false (and leaves the flag off) while remote server mode is on.
    pub fn set_work_on_network(&mut self, enabled: bool) -> bool {
        if enabled && self.remote_server_mode {
            warn!("Network upload can only work when remote server mode is off");
            self.work_on_network = false;
            return false;
        }
        self.work_on_network = enabled;
        true
    }
}

/// Remove `key` when its value is not a variant of `T`, so the field takes its default.
fn drop_unknown_variant<T: DeserializeOwned>(obj: &mut Map<String, Value>, key: &str) {
    let Some(value) = obj.get(key) else {
        return;
    };
    if serde_json::from_value::<T>(value.clone()).is_err() {
        warn!(key, value = %value, "Unknown setting value, using the default");
        obj.remove(key);
    }
}

/// Rewrite legacy persisted shapes into the current one.
///
/// Older versions stored link replacement profiles as a `linkReplacementProfiles`
/// array; it becomes the pretty-printed `linkReplacementConfig` string.
pub fn migrate_legacy(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        let legacy_is_array = obj
            .get("linkReplacementProfiles")
            .map(Value::is_array)
            .unwrap_or(false);
        if legacy_is_array {
            if let Some(profiles) = obj.remove("linkReplacementProfiles") {
                let config =
                    serde_json::to_string_pretty(&profiles).unwrap_or_else(|_| "[]".to_string());
                info!("Migrated legacy linkReplacementProfiles into linkReplacementConfig");
                obj.insert("linkReplacementConfig".to_string(), Value::String(config));
            }
        }
    }
    value
}
