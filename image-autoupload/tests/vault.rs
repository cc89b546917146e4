use image_autoupload::upload::PicGoRemover;
use image_autoupload::vault::{NoteDocument, Vault, VaultDeleter, TRASH_DIR};
use image_autoupload_core::contract::{Deleter, Document, Position, RepoFile, Workspace};
use image_autoupload_core::error::HostError;
use image_autoupload_core::settings::Settings;
use std::fs;
use tempfile::TempDir;

fn vault_with(files: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("temp vault");
    for path in files {
        let target = dir.path().join(path);
        fs::create_dir_all(target.parent().expect("parent")).expect("mkdir");
        fs::write(target, path.as_bytes()).expect("write");
    }
    dir
}

#[test]
fn test_files_are_vault_relative_and_skip_hidden_entries() {
    let dir = vault_with(&[
        "note.md",
        "img/b.png",
        "img/a.png",
        ".trash/old.png",
        ".obsidian/app.json",
        ".image-autoupload.json",
    ]);
    let vault = Vault::open(dir.path(), "note.md").expect("open");

    let paths: Vec<String> = vault.files().into_iter().map(|f| f.path).collect();

    assert_eq!(paths, vec!["img/a.png", "img/b.png", "note.md"]);
    assert_eq!(vault.active_file(), Some(RepoFile::new("note.md")));
}

#[test]
fn test_open_requires_existing_note() {
    let dir = vault_with(&["note.md"]);
    assert!(Vault::open(dir.path(), "other.md").is_err());
    assert!(Vault::open(dir.path().join("nope"), "note.md").is_err());
    assert!(Vault::open(dir.path(), "./note.md").is_ok());
}

#[tokio::test]
async fn test_read_binary_reports_missing_files() {
    let dir = vault_with(&["note.md", "a.png"]);
    let vault = Vault::open(dir.path(), "note.md").expect("open");

    let bytes = vault.read_binary(&RepoFile::new("a.png")).await.expect("read");
    assert_eq!(bytes, b"a.png");

    let err = vault.read_binary(&RepoFile::new("gone.png")).await.unwrap_err();
    assert!(matches!(err, HostError::NotFound(path) if path == "gone.png"));
}

#[tokio::test]
async fn test_note_document_edits_and_saves() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("note.md");
    fs::write(&path, "line one\nline two\n").expect("write");
    let doc = NoteDocument::load(&path).await.expect("load");

    assert!(!doc.save().await.expect("save"));

    doc.replace_range(
        "2",
        Position { line: 1, ch: 5 },
        Position { line: 1, ch: 8 },
    );
    assert_eq!(doc.get_value(), "line one\nline 2\n");

    assert!(doc.select("one"));
    assert!(!doc.select("three"));
    doc.replace_selection("1");
    assert_eq!(doc.get_value(), "line 1\nline 2\n");
    assert_eq!(doc.selection(), None);

    doc.replace_selection("end");
    assert!(doc.save().await.expect("save"));
    assert_eq!(fs::read_to_string(&path).expect("read"), "line 1\nline 2\nend");
}

#[tokio::test]
async fn test_trash_keeps_name_collisions_apart() {
    let dir = vault_with(&["note.md", "a/pic.png", "b/pic.png"]);
    let deleter = VaultDeleter::new(dir.path(), PicGoRemover::new(&Settings::default()));

    deleter.trash_file(&RepoFile::new("a/pic.png")).await.expect("trash a");
    deleter.trash_file(&RepoFile::new("b/pic.png")).await.expect("trash b");

    let trash = dir.path().join(TRASH_DIR);
    assert_eq!(fs::read(trash.join("pic.png")).expect("first"), b"a/pic.png");
    assert_eq!(fs::read(trash.join("pic 1.png")).expect("second"), b"b/pic.png");
    assert!(!dir.path().join("a/pic.png").exists());
}

#[tokio::test]
async fn test_write_binary_creates_missing_folders() {
    let dir = vault_with(&["note.md"]);
    let vault = Vault::open(dir.path(), "note.md").expect("open");

    vault
        .write_binary(&RepoFile::new("assets/web/sky.png"), b"png")
        .await
        .expect("write");

    assert_eq!(fs::read(dir.path().join("assets/web/sky.png")).expect("read"), b"png");
    assert!(vault.files().contains(&RepoFile::new("assets/web/sky.png")));
}
