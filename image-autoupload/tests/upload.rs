use image_autoupload::upload::{parse_picgo_core_output, PicGoResponse};
use image_autoupload_core::contract::UploadResponse;

#[test]
fn picgo_core_output_yields_urls_after_success_marker() {
    let stdout = "[PicGo INFO]: Before transform\n\
                  [PicGo INFO]: Uploading... Current uploader is [smms]\n\
                  [PicGo SUCCESS]: \n\
                  https://i.loli.net/a.png\n\
                  https://i.loli.net/b.png\n";

    let urls = parse_picgo_core_output(stdout).expect("success output");

    assert_eq!(urls, vec!["https://i.loli.net/a.png", "https://i.loli.net/b.png"]);
}

#[test]
fn picgo_core_output_without_marker_is_a_failure() {
    assert_eq!(
        parse_picgo_core_output("[PicGo ERROR]: Error: Request failed with status code 401"),
        None
    );
}

#[test]
fn picgo_server_response_maps_to_upload_response() {
    let res: PicGoResponse = serde_json::from_str(
        r#"{
            "success": true,
            "result": ["https://h/a.png"],
            "fullResult": [
                { "imgUrl": "https://h/a.png", "type": "github", "id": "7" },
                { "note": "no url here" }
            ]
        }"#,
    )
    .expect("valid response");

    let response: UploadResponse = res.into();

    assert!(response.success);
    assert_eq!(response.urls, vec!["https://h/a.png"]);
    assert_eq!(response.records.len(), 1);
    assert_eq!(response.records[0].img_url, "https://h/a.png");
    assert_eq!(response.records[0].metadata["type"], "github");
}

#[test]
fn picgo_server_failure_keeps_message() {
    let res: PicGoResponse =
        serde_json::from_str(r#"{ "success": false, "msg": "image not found" }"#)
            .expect("valid response");

    let response: UploadResponse = res.into();

    assert!(!response.success);
    assert!(response.urls.is_empty());
    assert_eq!(response.message.as_deref(), Some("image not found"));
}
