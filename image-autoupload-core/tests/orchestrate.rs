mod common;

use std::sync::{Arc, Mutex};

use common::{lenient_store, unused_deleter, MemoryDocument, MemoryWorkspace};
use image_autoupload_core::cache::content_hash;
use image_autoupload_core::contract::{
    Host, MockSettingsStore, MockUploader, RepoFile, UploadItem, UploadResponse,
};
use image_autoupload_core::error::UploadError;
use image_autoupload_core::orchestrate::{upload_all_images, upload_file_references, BatchOutcome};
use image_autoupload_core::settings::{Settings, UploadedImage};

fn ok_response(url: &str) -> UploadResponse {
    UploadResponse {
        success: true,
        urls: vec![url.to_string()],
        message: None,
        records: vec![UploadedImage::new(url)],
    }
}

fn item_name(item: &UploadItem) -> String {
    match item {
        UploadItem::File { file, .. } => file.name.clone(),
        UploadItem::Path(path) => path.clone(),
    }
}

/// Uploader that answers `https://img.host/<name>` for every item.
fn echo_uploader(times: usize) -> MockUploader {
    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .times(times)
        .returning(|items| Ok(ok_response(&format!("https://img.host/{}", item_name(&items[0])))));
    uploader
}

#[tokio::test]
async fn test_upload_all_rewrites_every_resolved_image() {
    let doc = MemoryDocument::new("# Note\n![[a.png]]\ntext ![shot](img/b.jpg)\n![[missing.png]]\n");
    let ws = MemoryWorkspace::new("notes/note.md")
        .with_file("notes/a.png", b"a")
        .with_file("notes/img/b.jpg", b"b");
    let uploader = echo_uploader(2);
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    let report = upload_all_images(&mut settings, &host, |_, _, _| {}).await;

    assert_eq!(
        report.outcome,
        BatchOutcome::Uploaded {
            succeeded: 2,
            failed: 0
        }
    );
    assert_eq!(
        doc.text(),
        "# Note\n![a.png](https://img.host/a.png)\ntext ![shot](https://img.host/b.jpg)\n![[missing.png]]\n"
    );
    assert_eq!(settings.uploaded_images.len(), 2);
}

#[tokio::test]
async fn test_identical_bytes_are_uploaded_once_with_cache() {
    let doc = MemoryDocument::new("![[a.png]] ![[b.png]]");
    let ws = MemoryWorkspace::new("note.md")
        .with_file("a.png", b"same bytes")
        .with_file("b.png", b"same bytes");
    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .times(1)
        .returning(|_| Ok(ok_response("https://img.host/1.png")));
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings {
        enable_cache: true,
        ..Settings::default()
    };

    let report = upload_all_images(&mut settings, &host, |_, _, _| {}).await;

    assert_eq!(report.batch.succeeded(), 2);
    assert_eq!(
        doc.text(),
        "![a.png](https://img.host/1.png) ![b.png](https://img.host/1.png)"
    );
    assert_eq!(settings.image_cache.len(), 1);
    assert_eq!(
        settings.image_cache.get(&content_hash(b"same bytes")),
        Some("https://img.host/1.png")
    );
}

#[tokio::test]
async fn test_cache_is_ignored_when_disabled() {
    let doc = MemoryDocument::new("![[a.png]] ![[b.png]]");
    let ws = MemoryWorkspace::new("note.md")
        .with_file("a.png", b"same bytes")
        .with_file("b.png", b"same bytes");
    let uploader = echo_uploader(2);
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    upload_all_images(&mut settings, &host, |_, _, _| {}).await;

    assert!(settings.image_cache.is_empty());
    assert!(ws.reads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_partial_failure_rewrites_only_successes() {
    let doc = MemoryDocument::new("![[a.png]] ![[b.png]] ![[c.png]]");
    let ws = MemoryWorkspace::new("note.md")
        .with_file("a.png", b"a")
        .with_file("b.png", b"b")
        .with_file("c.png", b"c");
    let mut uploader = MockUploader::new();
    uploader.expect_upload().times(3).returning(|items| {
        let name = item_name(&items[0]);
        if name == "b.png" {
            Err(UploadError::Transport("connection refused".to_string()))
        } else {
            Ok(ok_response(&format!("https://img.host/{name}")))
        }
    });
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    let report = upload_all_images(&mut settings, &host, |_, _, _| {}).await;

    assert_eq!(
        report.outcome,
        BatchOutcome::Uploaded {
            succeeded: 2,
            failed: 1
        }
    );
    assert_eq!(
        doc.text(),
        "![a.png](https://img.host/a.png) ![[b.png]] ![c.png](https://img.host/c.png)"
    );
    let failed = &report.batch.outcomes[1];
    assert!(failed.url.is_none());
    assert!(failed
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_all_failed_leaves_document_untouched() {
    let original = "![[a.png]] ![[b.png]]";
    let doc = MemoryDocument::new(original);
    let ws = MemoryWorkspace::new("note.md")
        .with_file("a.png", b"a")
        .with_file("b.png", b"b");
    let mut uploader = MockUploader::new();
    uploader.expect_upload().times(2).returning(|_| {
        Ok(UploadResponse {
            success: false,
            message: Some("server busy".to_string()),
            ..UploadResponse::default()
        })
    });
    let mut store = MockSettingsStore::new();
    store.expect_save().never();
    let deleter = unused_deleter();
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    let report = upload_all_images(&mut settings, &host, |_, _, _| {}).await;

    assert_eq!(report.outcome, BatchOutcome::AllFailed { failed: 2 });
    assert_eq!(report.batch.outcomes[0].error.as_deref(), Some("server busy"));
    assert_eq!(doc.text(), original);
}

#[tokio::test]
async fn test_switching_notes_mid_batch_discards_rewrites() {
    let original = "![[a.png]] ![[b.png]]";
    let doc = MemoryDocument::new(original);
    let ws = MemoryWorkspace::new("note.md")
        .with_file("a.png", b"a")
        .with_file("b.png", b"b");
    let uploader = echo_uploader(2);
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    let report = upload_all_images(&mut settings, &host, |current, _, _| {
        if current == 2 {
            ws.set_active("other.md");
        }
    })
    .await;

    assert_eq!(
        report.outcome,
        BatchOutcome::DocumentChanged {
            succeeded: 2,
            failed: 0
        }
    );
    assert_eq!(report.outcome.to_string(), "File has been changed, upload failure");
    assert_eq!(doc.text(), original);
}

#[tokio::test]
async fn test_progress_is_reported_in_order_before_each_upload() {
    let doc = MemoryDocument::new("![[a.png]] ![[b.png]] ![[c.png]]");
    let ws = MemoryWorkspace::new("note.md")
        .with_file("a.png", b"a")
        .with_file("b.png", b"b")
        .with_file("c.png", b"c");

    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let upload_events = Arc::clone(&events);
    let mut uploader = MockUploader::new();
    uploader.expect_upload().times(3).returning(move |items| {
        let name = item_name(&items[0]);
        upload_events.lock().unwrap().push(format!("upload {name}"));
        Ok(ok_response(&format!("https://img.host/{name}")))
    });
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    upload_all_images(&mut settings, &host, |current, total, name| {
        events
            .lock()
            .unwrap()
            .push(format!("progress {current}/{total} {name}"));
    })
    .await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "progress 1/3 a.png",
            "upload a.png",
            "progress 2/3 b.png",
            "upload b.png",
            "progress 3/3 c.png",
            "upload c.png",
        ]
    );
}

#[tokio::test]
async fn test_second_run_finds_nothing_to_upload() {
    let doc = MemoryDocument::new("![[a.png]]");
    let ws = MemoryWorkspace::new("note.md").with_file("a.png", b"a");
    let uploader = echo_uploader(1);
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    upload_all_images(&mut settings, &host, |_, _, _| {}).await;
    let rewritten = doc.text();
    let second = upload_all_images(&mut settings, &host, |_, _, _| {}).await;

    assert_eq!(second.outcome, BatchOutcome::NoImages);
    assert_eq!(second.outcome.to_string(), "Can not find image file");
    assert_eq!(doc.text(), rewritten);
}

#[tokio::test]
async fn test_remote_images_are_uploaded_by_link() {
    let doc = MemoryDocument::new("![](https://cdn.other.org/pic.png)");
    let ws = MemoryWorkspace::new("note.md");
    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .withf(|items| {
            items == &vec![UploadItem::Path("https://cdn.other.org/pic.png".to_string())]
        })
        .times(1)
        .returning(|_| Ok(ok_response("https://img.host/pic.png")));
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings {
        work_on_network: true,
        enable_cache: true,
        ..Settings::default()
    };

    let report = upload_all_images(&mut settings, &host, |_, _, _| {}).await;

    assert_eq!(report.batch.succeeded(), 1);
    assert_eq!(doc.text(), "![](https://img.host/pic.png)");
    assert!(settings.image_cache.is_empty());
}

#[tokio::test]
async fn test_each_success_is_persisted_immediately() {
    let doc = MemoryDocument::new("![[a.png]] ![[b.png]]");
    let ws = MemoryWorkspace::new("note.md")
        .with_file("a.png", b"a")
        .with_file("b.png", b"b");
    let uploader = echo_uploader(2);
    let mut store = MockSettingsStore::new();
    store.expect_save().times(2).returning(|_| Ok(()));
    let deleter = unused_deleter();
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings {
        enable_cache: true,
        ..Settings::default()
    };

    upload_all_images(&mut settings, &host, |_, _, _| {}).await;

    assert_eq!(settings.image_cache.len(), 2);
}

#[tokio::test]
async fn test_upload_file_references_sends_one_batch() {
    let doc = MemoryDocument::new("![[pic.png]] and ![x](img/pic.png) but not ![[other.png]]");
    let ws = MemoryWorkspace::new("note.md").with_file("img/pic.png", b"p");
    let mut uploader = MockUploader::new();
    uploader
        .expect_upload()
        .withf(|items| items.len() == 2)
        .times(1)
        .returning(|_| {
            Ok(UploadResponse {
                success: true,
                urls: vec![
                    "https://img.host/1.png".to_string(),
                    "https://img.host/2.png".to_string(),
                ],
                message: None,
                records: Vec::new(),
            })
        });
    let mut store = MockSettingsStore::new();
    store.expect_save().never();
    let deleter = unused_deleter();
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    let outcome = upload_file_references(&RepoFile::new("img/pic.png"), &mut settings, &host).await;

    assert_eq!(
        outcome,
        BatchOutcome::Uploaded {
            succeeded: 2,
            failed: 0
        }
    );
    assert_eq!(
        doc.text(),
        "![pic.png](https://img.host/1.png) and ![x](https://img.host/2.png) but not ![[other.png]]"
    );
}

#[tokio::test]
async fn test_upload_file_references_ignores_non_images() {
    let doc = MemoryDocument::new("![[report.pdf]]");
    let ws = MemoryWorkspace::new("note.md").with_file("report.pdf", b"%PDF");
    let mut uploader = MockUploader::new();
    uploader.expect_upload().never();
    let (deleter, store) = (unused_deleter(), lenient_store());
    let host = Host {
        document: &doc,
        workspace: &ws,
        uploader: &uploader,
        deleter: &deleter,
        store: &store,
    };
    let mut settings = Settings::default();

    let outcome = upload_file_references(&RepoFile::new("report.pdf"), &mut settings, &host).await;

    assert_eq!(outcome, BatchOutcome::NoImages);
}
