//! # image-autoupload CLI Interface
//!
//! Command-line host for the upload pipeline in [`image-autoupload-core`]: a vault
//! directory stands in for the editor's repository, a note file for the active
//! document, and PicGo (app or PicGo-Core) for the image host.
//!
//! All business logic lives in the core crate. This module parses arguments,
//! wires the filesystem collaborators into a [`Host`], runs one flow and prints
//! its user-facing report on stdout. Logs go to stderr.
//!
//! For programmatic and integration use, call [`run`] with a constructed [`Cli`].
//!
//! [`image-autoupload-core`]: ../../image_autoupload_core/
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image_autoupload_core::contract::{ClipboardFile, Document, Host, Uploader};
use image_autoupload_core::download::download_all_images;
use image_autoupload_core::link_replacement::{
    apply_link_replacement, find_profiles, LinkReplacementProfile,
};
use image_autoupload_core::orchestrate::{upload_all_images, upload_file_references, BatchOutcome};
use image_autoupload_core::paste::{
    can_upload, upload_clipboard, upload_dropped_files, upload_pasted_links, ClipboardContent,
    PasteOutcome,
};
use image_autoupload_core::remove::{delete_all_images, delete_selected_image, RemovalOutcome};
use image_autoupload_core::resolver::is_image_path;
use image_autoupload_core::settings::Settings;

use crate::fetch::HttpFetcher;
use crate::load_config::{load_settings, settings_path, JsonSettingsStore};
use crate::upload::{uploader_for, PicGoRemover};
use crate::vault::{NoteDocument, Vault, VaultDeleter};

/// Upload the images of markdown notes to an image host and rewrite the notes.
#[derive(Parser)]
#[clap(
    name = "image-autoupload",
    version,
    about = "Upload the images of a markdown note through PicGo and rewrite the note to the hosted URLs"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct VaultArgs {
    /// Root directory of the vault
    #[clap(long)]
    pub vault: PathBuf,
    /// Settings JSON file (defaults to <vault>/.image-autoupload.json)
    #[clap(long)]
    pub settings: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct NoteArgs {
    #[clap(flatten)]
    pub vault: VaultArgs,
    /// Vault-relative path of the note to work on
    #[clap(long)]
    pub note: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload every local (and, if enabled, remote) image of the note
    UploadAll {
        #[clap(flatten)]
        target: NoteArgs,
    },
    /// Download the note's network images into the vault and link the local copies
    DownloadAll {
        #[clap(flatten)]
        target: NoteArgs,
        /// Vault-relative folder to save into (defaults to the note's folder)
        #[clap(long)]
        folder: Option<String>,
    },
    /// Upload one vault image and rewrite every reference to it in the note
    UploadFile {
        #[clap(flatten)]
        target: NoteArgs,
        /// Vault-relative path of the image
        #[clap(long)]
        file: String,
    },
    /// Apply a link replacement profile to the note
    ReplaceLinks {
        #[clap(flatten)]
        target: NoteArgs,
        /// Profile name (case-insensitive, a unique substring is enough)
        #[clap(long)]
        profile: String,
    },
    /// List the configured link replacement profiles
    ListProfiles {
        #[clap(flatten)]
        vault: VaultArgs,
    },
    /// Delete uploaded images referenced by the note from the image host
    DeleteImages {
        #[clap(flatten)]
        target: NoteArgs,
        /// Only delete the image embed given here, e.g. `![](https://...)`
        #[clap(long)]
        selection: Option<String>,
    },
    /// Upload clipboard content into the note
    Paste {
        #[clap(flatten)]
        target: NoteArgs,
        /// Image files on the clipboard
        #[clap(long = "file")]
        files: Vec<PathBuf>,
        /// Text on the clipboard
        #[clap(long, default_value = "")]
        text: String,
    },
    /// Upload dropped image files into the note
    Drop {
        #[clap(flatten)]
        target: NoteArgs,
        /// Dropped files
        #[clap(long = "file", required = true)]
        files: Vec<PathBuf>,
    },
}

/// The collaborators of one CLI invocation on one note.
struct Session {
    vault: Vault,
    document: NoteDocument,
    uploader: Box<dyn Uploader>,
    deleter: VaultDeleter,
    store: JsonSettingsStore,
    settings: Settings,
}

impl Session {
    async fn open(args: &NoteArgs) -> Result<Self> {
        let path = settings_path(&args.vault.vault, args.vault.settings.as_deref());
        let settings = load_settings(&path)?;
        let vault = Vault::open(&args.vault.vault, &args.note)?;
        let document = NoteDocument::load(vault.absolute(vault.active()))
            .await
            .with_context(|| format!("Failed to read note {}", args.note))?;
        Ok(Self {
            uploader: uploader_for(&settings, vault.root()),
            deleter: VaultDeleter::new(vault.root(), PicGoRemover::new(&settings)),
            store: JsonSettingsStore::new(path),
            document,
            vault,
            settings,
        })
    }

    async fn save_note(&self) -> Result<()> {
        self.document
            .save()
            .await
            .with_context(|| format!("Failed to write note {}", self.vault.active().path))?;
        Ok(())
    }
}

fn clipboard_file(path: &Path) -> ClipboardFile {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime_type = match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if is_image_path(&name) => match ext.as_str() {
            "jpg" => "image/jpeg".to_string(),
            "svg" => "image/svg+xml".to_string(),
            ext => format!("image/{ext}"),
        },
        _ => "application/octet-stream".to_string(),
    };
    ClipboardFile {
        name,
        mime_type,
        path: Some(path.to_string_lossy().into_owned()),
    }
}

fn select_profile<'p>(
    profiles: &'p [LinkReplacementProfile],
    query: &str,
) -> Result<&'p LinkReplacementProfile> {
    if profiles.is_empty() {
        bail!("No link replacement profiles configured");
    }
    let found = find_profiles(profiles, query);
    if let Some(exact) = found.iter().find(|p| p.name.eq_ignore_ascii_case(query)) {
        return Ok(*exact);
    }
    match found.as_slice() {
        [only] => Ok(*only),
        [] => Err(anyhow!("No link replacement profile matches '{query}'")),
        many => Err(anyhow!(
            "'{query}' matches {} profiles: {}",
            many.len(),
            many.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
        )),
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::UploadAll { target } => {
            let mut session = Session::open(&target).await?;
            tracing::info!(command = "upload-all", note = %target.note, "Uploading note images");
            let host = Host {
                document: &session.document,
                workspace: &session.vault,
                uploader: session.uploader.as_ref(),
                deleter: &session.deleter,
                store: &session.store,
            };
            let report = upload_all_images(&mut session.settings, &host, |current, total, name| {
                println!("Uploading {current}/{total}: {name}");
            })
            .await;
            for failed in report.batch.outcomes.iter().filter(|o| o.url.is_none()) {
                println!(
                    "Failed: {} ({})",
                    failed.image.progress_name(),
                    failed.error.as_deref().unwrap_or("unknown error")
                );
            }
            println!("{}", report.outcome);
            session.save_note().await?;
            match report.outcome {
                BatchOutcome::AllFailed { .. } | BatchOutcome::DocumentChanged { .. } => {
                    bail!("{}", report.outcome)
                }
                _ => Ok(()),
            }
        }
        Commands::DownloadAll { target, folder } => {
            let session = Session::open(&target).await?;
            let folder = folder
                .map(|f| f.trim_start_matches("./").replace('\\', "/"))
                .unwrap_or_else(|| session.vault.active().parent_dir().to_string());
            tracing::info!(
                command = "download-all",
                folder = %folder,
                "Downloading network images"
            );
            let report = download_all_images(
                &session.document,
                &session.vault,
                &HttpFetcher::new(),
                &session.settings,
                &folder,
            )
            .await;
            for failed in &report.failed {
                println!("Failed: {} ({})", failed.url, failed.error);
            }
            println!("{report}");
            session.save_note().await?;
            if report.total > 0 && report.downloaded.is_empty() {
                bail!("No network image could be downloaded");
            }
            Ok(())
        }
        Commands::UploadFile { target, file } => {
            let mut session = Session::open(&target).await?;
            let image = session
                .vault
                .file(&file)
                .ok_or_else(|| anyhow!("File {file} not found in vault"))?;
            tracing::info!(command = "upload-file", file = %image.path, "Uploading single file");
            let host = Host {
                document: &session.document,
                workspace: &session.vault,
                uploader: session.uploader.as_ref(),
                deleter: &session.deleter,
                store: &session.store,
            };
            let outcome = upload_file_references(&image, &mut session.settings, &host).await;
            println!("{outcome}");
            session.save_note().await?;
            match outcome {
                BatchOutcome::AllFailed { .. } => bail!("{outcome}"),
                _ => Ok(()),
            }
        }
        Commands::ReplaceLinks { target, profile } => {
            let session = Session::open(&target).await?;
            let profiles = session.settings.link_replacement_profiles()?;
            let profile = select_profile(&profiles, &profile)?;
            tracing::info!(
                command = "replace-links",
                profile = %profile.name,
                "Applying link replacement"
            );
            let report = apply_link_replacement(&session.document, profile);
            for error in &report.errors {
                println!("Skipped rule: {error}");
            }
            println!("{}", report.outcome);
            session.save_note().await
        }
        Commands::ListProfiles { vault } => {
            let settings = load_settings(settings_path(&vault.vault, vault.settings.as_deref()))?;
            let profiles = settings.link_replacement_profiles()?;
            if profiles.is_empty() {
                println!("No link replacement profiles configured");
            }
            for profile in &profiles {
                let state = if profile.enabled { "enabled" } else { "disabled" };
                println!("{} ({} rule(s), {state})", profile.name, profile.rules.len());
            }
            Ok(())
        }
        Commands::DeleteImages { target, selection } => {
            let mut session = Session::open(&target).await?;
            tracing::info!(
                command = "delete-images",
                note = %target.note,
                "Deleting uploaded images"
            );
            let host = Host {
                document: &session.document,
                workspace: &session.vault,
                uploader: session.uploader.as_ref(),
                deleter: &session.deleter,
                store: &session.store,
            };
            let outcome = match selection {
                Some(selection) => {
                    if !session.document.select(&selection) {
                        bail!("The note does not contain the selection");
                    }
                    delete_selected_image(&mut session.settings, &host).await
                }
                None => delete_all_images(&mut session.settings, &host).await,
            };
            println!("{outcome}");
            session.save_note().await?;
            match outcome {
                RemovalOutcome::DeleteFailed { .. } | RemovalOutcome::Error { .. } => {
                    bail!("{outcome}")
                }
                _ => Ok(()),
            }
        }
        Commands::Paste {
            target,
            files,
            text,
        } => {
            let session = Session::open(&target).await?;
            let clipboard = ClipboardContent {
                files: files.iter().map(|p| clipboard_file(p)).collect(),
                text,
            };
            tracing::info!(command = "paste", files = clipboard.files.len(), "Handling paste");
            let document = &session.document;
            let uploader = session.uploader.as_ref();
            let outcome = if can_upload(&clipboard, &session.settings) {
                upload_clipboard(document, uploader, &session.settings, &clipboard).await
            } else {
                // Not an image paste: the text lands as-is, then its network images are uploaded.
                document.replace_selection(&clipboard.text);
                upload_pasted_links(document, uploader, &session.settings, &clipboard.text).await
            };
            println!("{outcome}");
            session.save_note().await?;
            match outcome {
                PasteOutcome::Failed { message } => bail!("Upload error: {message}"),
                _ => Ok(()),
            }
        }
        Commands::Drop { target, files } => {
            let session = Session::open(&target).await?;
            let dropped: Vec<ClipboardFile> = files.iter().map(|p| clipboard_file(p)).collect();
            tracing::info!(command = "drop", files = dropped.len(), "Handling drop");
            let outcome = upload_dropped_files(
                &session.document,
                session.uploader.as_ref(),
                &session.settings,
                &dropped,
            )
            .await;
            println!("{outcome}");
            session.save_note().await?;
            match outcome {
                PasteOutcome::Failed { message } => bail!("Upload error: {message}"),
                _ => Ok(()),
            }
        }
    }
}
