#![doc = "Uploader integration for the CLI: bridges the core `Uploader` contract to a running PicGo app or the PicGo-Core command line."]
//
//! # Uploaders
//!
//! - [`PicGoClient`] talks to the PicGo app's HTTP server (`uploadServer`).
//!   Normally it sends file paths as `{"list": [...]}` and PicGo reads the
//!   files itself; in remote server mode the file bytes travel as multipart
//!   parts instead, so PicGo may run on another machine.
//! - [`PicGoCoreClient`] runs `picgo upload <paths>` and reads the URLs PicGo-Core
//!   prints after its `[PicGo SUCCESS]` line.
//! - [`PicGoRemover`] asks the PicGo app to delete previously uploaded images.
//!
//! Use [`uploader_for`] to pick the implementation the settings ask for.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image_autoupload_core::contract::{
    ClipboardFile, ClipboardResponse, DeleteResponse, UploadItem, UploadResponse, Uploader,
};
use image_autoupload_core::error::{HostError, UploadError};
use image_autoupload_core::resolver::is_network_path;
use image_autoupload_core::settings::{Settings, UploadedImage, UploaderKind};
use reqwest::multipart;
use serde::Deserialize;
use serde_json::{json, Value};

/// Marker PicGo-Core prints right before the uploaded URLs.
pub const PICGO_CORE_SUCCESS: &str = "[PicGo SUCCESS]";

/// Reply of the PicGo HTTP server to upload and delete requests.
#[derive(Debug, Deserialize)]
pub struct PicGoResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Vec<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default, rename = "fullResult")]
    pub full_result: Vec<Value>,
}

impl PicGoResponse {
    /// Registry records from `fullResult`; entries without an `imgUrl` are dropped.
    pub fn records(&self) -> Vec<UploadedImage> {
        self.full_result
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect()
    }
}

impl From<PicGoResponse> for UploadResponse {
    fn from(res: PicGoResponse) -> Self {
        let records = res.records();
        UploadResponse {
            success: res.success,
            urls: res.result,
            message: res.msg,
            records,
        }
    }
}

/// Filesystem path an item is uploaded from, or the link itself for remote images.
fn item_location(vault_root: &Path, item: &UploadItem) -> String {
    match item {
        UploadItem::File { file, .. } => vault_root.join(&file.path).to_string_lossy().into_owned(),
        UploadItem::Path(path) => path.clone(),
    }
}

fn mime_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tiff" => "image/tiff",
        "webp" => "image/webp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

pub struct PicGoClient {
    http: reqwest::Client,
    upload_server: String,
    remote_server_mode: bool,
    vault_root: PathBuf,
}

impl PicGoClient {
    pub fn new(settings: &Settings, vault_root: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            upload_server: settings.upload_server.clone(),
            remote_server_mode: settings.remote_server_mode,
            vault_root: vault_root.into(),
        }
    }

    async fn file_part(&self, location: &str) -> Result<multipart::Part, UploadError> {
        if is_network_path(location) {
            return Err(UploadError::Rejected(
                "remote server mode cannot upload network images".to_string(),
            ));
        }
        let bytes = tokio::fs::read(location).await.map_err(HostError::from)?;
        let name = location
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(location)
            .to_string();
        multipart::Part::bytes(bytes)
            .file_name(name.clone())
            .mime_str(mime_for(&name))
            .map_err(|e| UploadError::Transport(format!("mime: {e}")))
    }

    async fn multipart_form(&self, locations: &[String]) -> Result<multipart::Form, UploadError> {
        let mut form = multipart::Form::new();
        for location in locations {
            form = form.part("list", self.file_part(location).await?);
        }
        Ok(form)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<PicGoResponse, UploadError> {
        let response = request
            .send()
            .await
            .map_err(|e| UploadError::Transport(format!("request: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(UploadError::Transport(format!("status {status}: {body}")));
        }
        response
            .json::<PicGoResponse>()
            .await
            .map_err(|e| UploadError::Transport(format!("body: {e}")))
    }
}

#[async_trait]
impl Uploader for PicGoClient {
    async fn upload(&self, items: Vec<UploadItem>) -> Result<UploadResponse, UploadError> {
        let locations: Vec<String> = items
            .iter()
            .map(|item| item_location(&self.vault_root, item))
            .collect();
        tracing::info!(
            server = %self.upload_server,
            count = locations.len(),
            remote_server_mode = self.remote_server_mode,
            "Uploading images to PicGo"
        );

        let request = if self.remote_server_mode {
            let form = self.multipart_form(&locations).await?;
            self.http.post(&self.upload_server).multipart(form)
        } else {
            self.http
                .post(&self.upload_server)
                .json(&json!({ "list": locations }))
        };
        let res = self.send(request).await?;

        if res.success {
            tracing::info!(urls = res.result.len(), "PicGo upload succeeded");
        } else {
            tracing::error!(message = ?res.msg, "PicGo rejected the upload");
        }
        Ok(res.into())
    }

    async fn upload_clipboard(
        &self,
        files: Vec<ClipboardFile>,
    ) -> Result<ClipboardResponse, UploadError> {
        let paths: Vec<String> = files.iter().filter_map(|f| f.path.clone()).collect();
        let request = if self.remote_server_mode && !paths.is_empty() {
            let form = self.multipart_form(&paths).await?;
            self.http.post(&self.upload_server).multipart(form)
        } else {
            // An upload request without a list makes PicGo read its own clipboard.
            self.http.post(&self.upload_server)
        };
        tracing::info!(server = %self.upload_server, "Uploading clipboard image to PicGo");
        let res = self.send(request).await?;

        Ok(match res.result.into_iter().next() {
            Some(url) if res.success => ClipboardResponse {
                code: 0,
                data: Some(url),
                message: None,
            },
            _ => ClipboardResponse {
                code: -1,
                data: None,
                message: Some(res.msg.unwrap_or_else(|| "Upload error".to_string())),
            },
        })
    }
}

/// URLs printed by `picgo upload`, or `None` when the run did not report success.
pub fn parse_picgo_core_output(stdout: &str) -> Option<Vec<String>> {
    let start = stdout.find(PICGO_CORE_SUCCESS)?;
    let after = &stdout[start + PICGO_CORE_SUCCESS.len()..];
    let urls: Vec<String> = after
        .lines()
        .map(|line| line.trim().trim_start_matches(':').trim())
        .filter(|line| is_network_path(line))
        .map(str::to_string)
        .collect();
    Some(urls)
}

pub struct PicGoCoreClient {
    command: String,
    vault_root: PathBuf,
}

impl PicGoCoreClient {
    pub fn new(settings: &Settings, vault_root: impl Into<PathBuf>) -> Self {
        let command = if settings.picgo_core_path.trim().is_empty() {
            "picgo".to_string()
        } else {
            settings.picgo_core_path.clone()
        };
        Self {
            command,
            vault_root: vault_root.into(),
        }
    }

    async fn run(&self, paths: &[String]) -> Result<Vec<String>, UploadError> {
        tracing::info!(command = %self.command, count = paths.len(), "Running PicGo-Core upload");
        let output = tokio::process::Command::new(&self.command)
            .arg("upload")
            .args(paths)
            .output()
            .await
            .map_err(|e| UploadError::Transport(format!("could not run {}: {e}", self.command)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_picgo_core_output(&stdout) {
            Some(urls) if !urls.is_empty() => Ok(urls),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = match stderr.trim() {
                    "" => stdout.trim().to_string(),
                    stderr => stderr.to_string(),
                };
                tracing::error!(
                    status = ?output.status,
                    message = %message,
                    "PicGo-Core upload failed"
                );
                Err(UploadError::Rejected(message))
            }
        }
    }
}

#[async_trait]
impl Uploader for PicGoCoreClient {
    async fn upload(&self, items: Vec<UploadItem>) -> Result<UploadResponse, UploadError> {
        let paths: Vec<String> = items
            .iter()
            .map(|item| item_location(&self.vault_root, item))
            .collect();
        let urls = self.run(&paths).await?;
        Ok(UploadResponse {
            success: true,
            urls,
            message: None,
            records: Vec::new(),
        })
    }

    async fn upload_clipboard(
        &self,
        files: Vec<ClipboardFile>,
    ) -> Result<ClipboardResponse, UploadError> {
        // Without paths PicGo-Core uploads whatever is on the system clipboard.
        let paths: Vec<String> = files.iter().filter_map(|f| f.path.clone()).collect();
        match self.run(&paths).await {
            Ok(urls) => Ok(ClipboardResponse {
                code: 0,
                data: urls.into_iter().next(),
                message: None,
            }),
            Err(e) => Ok(ClipboardResponse {
                code: -1,
                data: None,
                message: Some(e.to_string()),
            }),
        }
    }
}

/// Pick the uploader the settings ask for.
pub fn uploader_for(settings: &Settings, vault_root: &Path) -> Box<dyn Uploader> {
    match settings.uploader {
        UploaderKind::PicGo => Box::new(PicGoClient::new(settings, vault_root)),
        UploaderKind::PicGoCore => Box::new(PicGoCoreClient::new(settings, vault_root)),
    }
}

/// Deletes uploaded images through the PicGo app's delete endpoint.
pub struct PicGoRemover {
    http: reqwest::Client,
    delete_server: String,
}

impl PicGoRemover {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            delete_server: settings.delete_server.clone(),
        }
    }

    pub async fn delete(&self, records: Vec<UploadedImage>) -> Result<DeleteResponse, HostError> {
        tracing::info!(
            server = %self.delete_server,
            count = records.len(),
            "Deleting uploaded images"
        );
        let response = self
            .http
            .post(&self.delete_server)
            .json(&json!({ "list": records }))
            .send()
            .await
            .map_err(|e| HostError::Other(format!("request: {e}")))?;
        if !response.status().is_success() {
            return Err(HostError::Other(format!("status {}", response.status())));
        }
        let res: PicGoResponse = response
            .json()
            .await
            .map_err(|e| HostError::Other(format!("body: {e}")))?;
        Ok(DeleteResponse {
            success: res.success,
            message: res.msg,
        })
    }
}
