//! Avatar upload to the object bucket.

use axum::{extract::State, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::present;
use crate::api::AppState;
use crate::error::ServerError;
use crate::extract::JsonBody;

/// Content type recorded for every avatar.  The payload's real format is
/// not inspected.
pub const AVATAR_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Deserialize)]
pub struct AvatarUploadRequest {
    /// Base64 image, optionally as a `data:` URI.
    image: Option<String>,
    /// Owner of the avatar; a number or a string.
    user_id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct AvatarUploadResponse {
    url: String,
}

/// `POST /upload-avatar`: store the image and return its public URL.
pub async fn upload(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AvatarUploadRequest>,
) -> Result<Json<AvatarUploadResponse>, ServerError> {
    let missing = || ServerError::validation("Missing image or user_id");

    let image = present(req.image).ok_or_else(missing)?;
    let owner = match req.user_id {
        Some(value) => owner_segment(&value)?,
        None => None,
    }
    .ok_or_else(missing)?;

    let data = decode_image(&image)?;
    let key = avatar_key(&owner, Uuid::new_v4());

    state
        .objects
        .put_object(&key, &data, AVATAR_CONTENT_TYPE)
        .await?;
    let url = state.objects.public_url(&key);

    info!(user_id = %owner, key = %key, size = data.len(), "Avatar uploaded");
    Ok(Json(AvatarUploadResponse { url }))
}

/// Object key for an avatar: `avatars/<user_id>/<file_id>.jpg`.
pub fn avatar_key(owner: &str, file_id: Uuid) -> String {
    format!("avatars/{owner}/{file_id}.jpg")
}

/// Everything after the first comma, if there is one.
pub fn strip_data_uri(payload: &str) -> &str {
    payload
        .split_once(',')
        .map_or(payload, |(_, encoded)| encoded)
}

/// Decode a base64 image payload, with or without a `data:` prefix.
/// Whitespace inside the payload (line-wrapped base64) is ignored.
pub fn decode_image(payload: &str) -> Result<Vec<u8>, ServerError> {
    let encoded: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let data = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ServerError::Decoding(e.to_string()))?;
    if data.is_empty() {
        return Err(ServerError::Decoding("empty image".to_string()));
    }
    Ok(data)
}

/// The path segment naming the avatar's owner.
///
/// `Ok(None)` means "missing" (`null`, `0`, `""`, `false`).  Anything that
/// could not be a user id, or would not be a single safe path segment, is
/// rejected.
fn owner_segment(value: &Value) -> Result<Option<String>, ServerError> {
    let invalid = || ServerError::validation("Invalid user_id");

    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(None),
            Some(id) => Ok(Some(id.to_string())),
            None => Err(invalid()),
        },
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => {
            let safe = s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if safe {
                Ok(Some(s.clone()))
            } else {
                Err(invalid())
            }
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use rand::RngCore;
    use serde_json::json;

    use super::*;
    use crate::api::test_support::TestApp;

    fn key_from_url(url: &str) -> &str {
        url.split_once("/bucket/").map(|(_, key)| key).unwrap()
    }

    async fn upload_ok(app: &TestApp, image: &str, user_id: Value) -> String {
        let res = app
            .call(
                Method::POST,
                "/upload-avatar",
                None,
                Some(json!({ "image": image, "user_id": user_id })),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{:?}", res.json);
        assert_eq!(res.header("access-control-allow-origin"), "*");
        res.json["url"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn upload_stores_jpeg_under_user_prefix() {
        let app = TestApp::new().await;
        let png = b"\x89PNG\r\n\x1a\nnot really a png";
        let url = upload_ok(&app, &STANDARD.encode(png), json!(7)).await;

        assert!(
            url.starts_with("https://cdn.test/projects/acct/bucket/avatars/7/"),
            "{url}"
        );
        assert!(url.ends_with(".jpg"));

        let key = key_from_url(&url);
        let file_id = key
            .trim_start_matches("avatars/7/")
            .trim_end_matches(".jpg");
        assert!(Uuid::parse_str(file_id).is_ok());

        assert_eq!(app.state.objects.get_object(key).await.unwrap(), png);
        let meta = app.state.objects.head_object(key).await.unwrap();
        assert_eq!(meta.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn data_uri_prefix_decodes_to_same_bytes() {
        let app = TestApp::new().await;
        let mut raw = vec![0u8; 4096];
        rand::thread_rng().fill_bytes(&mut raw);
        let encoded = STANDARD.encode(&raw);

        let plain = upload_ok(&app, &encoded, json!("42")).await;
        let prefixed = upload_ok(
            &app,
            &format!("data:image/jpeg;base64,{encoded}"),
            json!("42"),
        )
        .await;
        assert_ne!(plain, prefixed, "every upload gets a fresh file id");

        let a = app.state.objects.get_object(key_from_url(&plain)).await.unwrap();
        let b = app
            .state
            .objects
            .get_object(key_from_url(&prefixed))
            .await
            .unwrap();
        assert_eq!(a, raw);
        assert_eq!(b, raw);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let app = TestApp::new().await;
        let image = STANDARD.encode(b"img");

        for body in [
            json!({ "user_id": 1 }),
            json!({ "image": image }),
            json!({ "image": "", "user_id": 1 }),
            json!({ "image": image, "user_id": null }),
            json!({ "image": image, "user_id": 0 }),
            json!({}),
        ] {
            let res = app
                .call(Method::POST, "/upload-avatar", None, Some(body))
                .await;
            assert_eq!(res.status, StatusCode::BAD_REQUEST);
            assert_eq!(res.json, json!({ "error": "Missing image or user_id" }));
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_a_client_error() {
        let app = TestApp::new().await;

        for image in ["%%%not-base64%%%", "data:image/png;base64,", "QUJD="] {
            let res = app
                .call(
                    Method::POST,
                    "/upload-avatar",
                    None,
                    Some(json!({ "image": image, "user_id": 1 })),
                )
                .await;
            assert_eq!(res.status, StatusCode::BAD_REQUEST, "{image}");
            assert_eq!(res.json, json!({ "error": "Invalid image data" }));
        }
    }

    #[tokio::test]
    async fn unsafe_user_id_is_rejected() {
        let app = TestApp::new().await;
        let image = STANDARD.encode(b"img");

        for user_id in [json!("../etc"), json!("a/b"), json!(1.5), json!([1])] {
            let res = app
                .call(
                    Method::POST,
                    "/upload-avatar",
                    None,
                    Some(json!({ "image": image, "user_id": user_id })),
                )
                .await;
            assert_eq!(res.status, StatusCode::BAD_REQUEST);
            assert_eq!(res.json, json!({ "error": "Invalid user_id" }));
        }
    }

    #[tokio::test]
    async fn oversized_avatar_is_rejected() {
        let app = TestApp::new().await;
        let too_big = vec![1u8; app.state.config.max_avatar_size + 1];
        let res = app
            .call(
                Method::POST,
                "/upload-avatar",
                None,
                Some(json!({ "image": STANDARD.encode(&too_big), "user_id": 3 })),
            )
            .await;
        assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn strip_data_uri_takes_everything_after_first_comma() {
        assert_eq!(strip_data_uri("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_uri("QUJD"), "QUJD");
        assert_eq!(strip_data_uri("a,b,c"), "b,c");
    }

    #[test]
    fn decode_ignores_line_wrapping() {
        assert_eq!(decode_image("QU\nJD\r\n").unwrap(), b"ABC");
    }
}
