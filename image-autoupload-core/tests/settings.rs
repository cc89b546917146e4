use image_autoupload_core::cache::content_hash;
use image_autoupload_core::error::ConfigError;
use image_autoupload_core::settings::{migrate_legacy, ImageDesc, Settings, UploaderKind};
use serde_json::{json, Value};

#[test]
fn test_null_yields_defaults() {
    let settings = Settings::from_json(Value::Null).expect("defaults");

    assert_eq!(settings, Settings::default());
    assert!(settings.upload_by_clip_switch);
    assert_eq!(settings.uploader, UploaderKind::PicGo);
    assert_eq!(settings.upload_server, "http://127.0.0.1:36677/upload");
    assert_eq!(settings.delete_server, "http://127.0.0.1:36677/delete");
    assert!(!settings.work_on_network);
    assert!(!settings.enable_cache);
    assert_eq!(settings.link_replacement_config, "[]");
}

#[test]
fn test_partial_object_keeps_remaining_defaults() {
    let settings = Settings::from_json(json!({
        "uploader": "PicGo-Core",
        "workOnNetWork": true,
        "newWorkBlackDomains": "a.com",
        "imageDesc": "removeDefault",
        "someFutureKey": 42
    }))
    .expect("valid settings");

    assert_eq!(settings.uploader, UploaderKind::PicGoCore);
    assert!(settings.work_on_network);
    assert_eq!(settings.network_black_domains, "a.com");
    assert_eq!(settings.image_desc, ImageDesc::RemoveDefault);
    assert_eq!(settings.figure_caption_margin_top, "0.5rem");
}

#[test]
fn test_persisted_keys_keep_their_historical_names() {
    let value = Settings::default().to_json();

    assert!(value.get("workOnNetWork").is_some());
    assert!(value.get("newWorkBlackDomains").is_some());
    assert_eq!(value["uploader"], "PicGo");
    assert_eq!(value["imageFormat"], "markdown");
    assert_eq!(value["figureCaptionMode"], "captionOnly");
}

#[test]
fn test_invalid_settings_are_rejected() {
    let err = Settings::from_json(json!({ "enableCache": "yes" })).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidSettings(_)));
}

#[test]
fn test_unknown_enum_values_fall_back_to_defaults() {
    let settings = Settings::from_json(json!({
        "uploader": "FTP",
        "imageDesc": "foo",
        "imageFormat": 3,
        "figureAlign": "justify",
        "figureCaptionMode": "sometimes",
        "workOnNetWork": true,
        "linkReplacementConfig": "[]"
    }))
    .expect("unknown values are tolerated");

    let defaults = Settings::default();
    assert_eq!(settings.uploader, defaults.uploader);
    assert_eq!(settings.image_desc, defaults.image_desc);
    assert_eq!(settings.image_format, defaults.image_format);
    assert_eq!(settings.figure_align, defaults.figure_align);
    assert_eq!(settings.figure_caption_mode, defaults.figure_caption_mode);
    assert!(settings.work_on_network);
}

#[test]
fn test_legacy_profiles_are_migrated() {
    let legacy = json!({
        "linkReplacementProfiles": [
            { "id": "p", "name": "Legacy", "rules": [], "enabled": true }
        ]
    });

    let migrated = migrate_legacy(legacy.clone());
    assert!(migrated.get("linkReplacementProfiles").is_none());
    assert!(migrated["linkReplacementConfig"].is_string());

    let settings = Settings::from_json(legacy).expect("migrated settings");
    let profiles = settings.link_replacement_profiles().expect("valid profiles");
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].name, "Legacy");
}

#[test]
fn test_current_shape_is_left_alone_by_migration() {
    let current = json!({ "linkReplacementConfig": "[]", "enableCache": true });
    assert_eq!(migrate_legacy(current.clone()), current);
}

#[test]
fn test_malformed_profiles_surface_as_config_error() {
    let settings = Settings {
        link_replacement_config: "[{".to_string(),
        ..Settings::default()
    };
    assert!(matches!(
        settings.link_replacement_profiles(),
        Err(ConfigError::InvalidLinkReplacement(_))
    ));
}

#[test]
fn test_profiles_round_trip_through_settings() {
    let mut settings = Settings::default();
    let profiles = Settings {
        link_replacement_config:
            r#"[{"id":"p","name":"Mirror","rules":[{"id":"r","pattern":"a","replacement":"b","flags":"gi"}]}]"#
                .to_string(),
        ..Settings::default()
    }
    .link_replacement_profiles()
    .expect("valid profiles");

    settings.set_link_replacement_profiles(&profiles);

    assert_eq!(settings.link_replacement_profiles().expect("valid profiles"), profiles);
}

#[test]
fn test_black_domains_are_split_and_matched_case_insensitively() {
    let settings = Settings {
        network_black_domains: " a.com ,\n\nImg.B.org,".to_string(),
        ..Settings::default()
    };

    assert_eq!(settings.black_domains(), vec!["a.com", "Img.B.org"]);
    assert!(settings.is_black_domain("https://IMG.b.org/x.png"));
    assert!(!settings.is_black_domain("https://c.net/x.png"));
    assert!(!Settings::default().is_black_domain("https://c.net/x.png"));
}

#[test]
fn test_remote_server_mode_excludes_network_upload() {
    let mut settings = Settings::default();
    assert!(settings.set_work_on_network(true));

    settings.set_remote_server_mode(true);
    assert!(!settings.work_on_network);
    assert!(!settings.set_work_on_network(true));
    assert!(!settings.work_on_network);

    settings.set_remote_server_mode(false);
    assert!(settings.set_work_on_network(true));
}

#[test]
fn test_uploaded_image_metadata_is_preserved() {
    let hash = content_hash(b"a");
    let mut value = json!({
        "uploadedImages": [{ "imgUrl": "https://h/a.png", "id": "abc", "type": "github" }],
    });
    value["imageCache"] = json!({});
    value["imageCache"][hash.as_str()] = json!("https://h/a.png");
    let settings = Settings::from_json(value).expect("valid settings");

    let record = &settings.uploaded_images[0];
    assert_eq!(record.img_url, "https://h/a.png");
    assert_eq!(record.metadata["id"], "abc");
    assert_eq!(settings.image_cache.get(&content_hash(b"a")), Some("https://h/a.png"));

    let value = settings.to_json();
    assert_eq!(value["uploadedImages"][0]["type"], "github");
}

#[test]
fn test_content_hash_is_sha256_hex() {
    assert_eq!(
        content_hash(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
