//! Request extractors shared by the handlers.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::error::ServerError;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The calling user's id, taken from the `X-User-Id` header.
///
/// The header is trusted as given: verifying it is the job of whatever
/// authentication layer sits in front of this server.  A missing, empty or
/// non-numeric header rejects the request with 401 before any other
/// extractor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(CallerId)
            .ok_or(ServerError::Unauthorized)
    }
}

/// JSON request body.
///
/// Unlike `axum::Json` this ignores the `Content-Type` header and treats an
/// empty body as `{}`; any parse failure becomes a 400 with a JSON error.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
                ServerError::RequestTooLarge
            } else {
                ServerError::validation("Invalid request body")
            }
        })?;

        let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            &b"{}"[..]
        } else {
            &bytes[..]
        };

        serde_json::from_slice(raw)
            .map(JsonBody)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejecting malformed JSON body");
                ServerError::validation("Invalid JSON body")
            })
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, Default)]
    struct Probe {
        name: Option<String>,
    }

    async fn caller(header: Option<&str>) -> Result<CallerId, ServerError> {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("X-User-Id", value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CallerId::from_request_parts(&mut parts, &()).await
    }

    async fn body(raw: &'static str) -> Result<JsonBody<Probe>, ServerError> {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(raw))
            .unwrap();
        JsonBody::<Probe>::from_request(req, &()).await
    }

    #[tokio::test]
    async fn caller_id_parses_header() {
        assert_eq!(caller(Some("42")).await.unwrap(), CallerId(42));
        assert_eq!(caller(Some(" 7 ")).await.unwrap(), CallerId(7));
    }

    #[tokio::test]
    async fn caller_id_missing_or_garbage_is_unauthorized() {
        for header in [None, Some(""), Some("abc")] {
            assert!(matches!(
                caller(header).await,
                Err(ServerError::Unauthorized)
            ));
        }
    }

    #[tokio::test]
    async fn empty_body_is_empty_object() {
        let JsonBody(probe) = body("").await.unwrap();
        assert!(probe.name.is_none());
    }

    #[tokio::test]
    async fn body_without_content_type_is_parsed() {
        let JsonBody(probe) = body(r#"{"name":"x"}"#).await.unwrap();
        assert_eq!(probe.name.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let err = body("{not json").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid JSON body");
    }
}
