/// `load_config` module: loads the persisted JSON settings of a vault and applies
/// environment overrides.
///
/// This is the only place where the settings file is read or written. The file
/// keeps the camelCase shape of the editor plugin, so one file serves both.
///
/// # Responsibilities
/// - Resolve the settings path (explicit `--settings`, else `<vault>/.image-autoupload.json`)
/// - Fall back to defaults when no settings were persisted yet
/// - Override the upload and delete server URLs from `IMAGE_AUTOUPLOAD_SERVER`
///   and `IMAGE_AUTOUPLOAD_DELETE_SERVER`
/// - Persist settings again after cache and registry writes ([`JsonSettingsStore`])
///
/// # Errors
/// Loading errors are `anyhow::Error` with the file path in context and surface at
/// the CLI boundary. Saving errors are `HostError`s, logged by the core flows.
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image_autoupload_core::contract::SettingsStore;
use image_autoupload_core::error::HostError;
use image_autoupload_core::settings::Settings;
use serde_json::Value;
use tracing::{error, info};

pub const SETTINGS_FILE: &str = ".image-autoupload.json";
pub const SERVER_ENV: &str = "IMAGE_AUTOUPLOAD_SERVER";
pub const DELETE_SERVER_ENV: &str = "IMAGE_AUTOUPLOAD_DELETE_SERVER";

/// The settings file to use for `vault`.
pub fn settings_path(vault: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => vault.join(SETTINGS_FILE),
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(server) = env::var(SERVER_ENV) {
        if !server.trim().is_empty() {
            info!(env = SERVER_ENV, server = %server, "Upload server overridden from environment");
            settings.upload_server = server;
        }
    }
    if let Ok(server) = env::var(DELETE_SERVER_ENV) {
        if !server.trim().is_empty() {
            info!(
                env = DELETE_SERVER_ENV,
                server = %server,
                "Delete server overridden from environment"
            );
            settings.delete_server = server;
        }
    }
}

/// Load settings from `path`; a missing file yields the defaults.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    info!(settings_path = ?path_ref, "Loading settings");

    let raw: Value = match fs::read_to_string(path_ref) {
        Ok(content) => serde_json::from_str(&content).map_err(|e| {
            error!(error = ?e, settings_path = ?path_ref, "Failed to parse settings JSON");
            anyhow::anyhow!("Failed to parse settings JSON {:?}: {e}", path_ref)
        })?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(settings_path = ?path_ref, "Settings file not found, using defaults");
            Value::Null
        }
        Err(e) => {
            error!(error = ?e, settings_path = ?path_ref, "Failed to read settings file");
            return Err(anyhow::anyhow!(
                "Failed to read settings file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut settings = Settings::from_json(raw)
        .with_context(|| format!("Invalid settings in {}", path_ref.display()))?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Writes settings back to the JSON file they were loaded from.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn save(&self, settings: &Settings) -> Result<(), HostError> {
        let content = serde_json::to_string_pretty(&settings.to_json())
            .map_err(|e| HostError::Other(format!("could not serialize settings: {e}")))?;
        tokio::fs::write(&self.path, content).await?;
        tracing::debug!(settings_path = ?self.path, "Settings saved");
        Ok(())
    }
}
