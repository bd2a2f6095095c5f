use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method},
    routing::{get, post},
    Json, Router,
};
use hearth_store::Database;
use serde::Serialize;
use tower_http::cors::{AllowMethods, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::extract::USER_ID_HEADER;
use crate::handlers::{auth, avatar, chats, method_not_allowed};
use crate::object_store::ObjectStore;

/// How long browsers may cache a preflight response (one day).
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Everything a handler can reach.  Holds configuration and the object
/// bucket; database connections are opened per request by [`AppState::with_db`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub objects: Arc<ObjectStore>,
}

impl AppState {
    /// Run `f` on the blocking pool against a connection opened just for
    /// this call.  The connection is closed when `f` returns, whether it
    /// succeeded or not.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> hearth_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.config.database_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut db = Database::connect(&path)?;
            f(&mut db)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Database task failed: {e}")))?
        .map_err(ServerError::from)
    }
}

/// CORS policy of one handler.  `OPTIONS` is answered by the layer itself
/// (200, empty body); every other response gets `Access-Control-Allow-Origin: *`.
fn cors(methods: impl Into<AllowMethods>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)])
        .max_age(PREFLIGHT_MAX_AGE)
}

pub fn build_router(state: AppState) -> Router {
    let identity = Router::new()
        .route(
            "/auth",
            post(auth::sign_in).fallback(method_not_allowed),
        )
        .layer(cors([Method::GET, Method::POST, Method::OPTIONS]));

    let chat = Router::new()
        .route(
            "/chats",
            get(chats::list)
                .post(chats::create)
                .delete(chats::delete)
                // `get` would otherwise answer HEAD as well
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .layer(cors([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ]));

    let upload = Router::new()
        .route(
            "/upload-avatar",
            post(avatar::upload).fallback(method_not_allowed),
        )
        .layer(cors([Method::POST, Method::OPTIONS]));

    Router::new()
        .route("/health", get(health_check))
        .merge(identity)
        .merge(chat)
        .merge(upload)
        .layer(DefaultBodyLimit::max(state.config.max_request_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;

    use super::test_support::TestApp;
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let app = TestApp::new().await;
        let res = app.call(Method::GET, "/health", None, None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.json["status"], "ok");
    }

    async fn preflight(app: &TestApp, uri: &str) -> super::test_support::TestResponse {
        app.send(
            Request::builder()
                .method(Method::OPTIONS)
                .uri(uri)
                .header(header::ORIGIN, "https://app.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    #[tokio::test]
    async fn preflight_is_method_specific() {
        let app = TestApp::new().await;

        for (uri, expected, absent) in [
            ("/auth", &["GET", "POST", "OPTIONS"][..], Some("DELETE")),
            ("/chats", &["GET", "POST", "DELETE", "OPTIONS"][..], None),
            ("/upload-avatar", &["POST", "OPTIONS"][..], Some("GET")),
        ] {
            let res = preflight(&app, uri).await;
            assert_eq!(res.status, StatusCode::OK, "{uri}");
            assert_eq!(res.json, serde_json::Value::Null, "{uri} body not empty");
            assert_eq!(res.header("access-control-allow-origin"), "*");
            assert_eq!(res.header("access-control-max-age"), "86400");

            let methods = res.header("access-control-allow-methods");
            for method in expected {
                assert!(methods.contains(method), "{uri}: {methods}");
            }
            if let Some(method) = absent {
                assert!(!methods.contains(method), "{uri}: {methods}");
            }

            let headers = res.header("access-control-allow-headers").to_lowercase();
            assert!(headers.contains("content-type"));
            assert!(headers.contains("x-user-id"));
        }
    }

    #[tokio::test]
    async fn preflight_without_origin_still_answers() {
        let app = TestApp::new().await;
        let res = app.call(Method::OPTIONS, "/chats", None, None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header("access-control-allow-origin"), "*");
    }

    #[tokio::test]
    async fn unsupported_methods_get_json_405() {
        let app = TestApp::new().await;

        for (method, uri) in [
            (Method::GET, "/auth"),
            (Method::PUT, "/auth"),
            (Method::PATCH, "/chats"),
            (Method::GET, "/upload-avatar"),
            (Method::DELETE, "/upload-avatar"),
        ] {
            let res = app.call(method.clone(), uri, Some(1), None).await;
            assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
            assert_eq!(res.json, json!({ "error": "Method not allowed" }));
            assert_eq!(res.header("access-control-allow-origin"), "*");
            assert!(res.header("content-type").starts_with("application/json"));
        }
    }

    #[tokio::test]
    async fn head_is_not_served() {
        let app = TestApp::new().await;

        for uri in ["/auth", "/chats", "/upload-avatar"] {
            let res = app.call(Method::HEAD, uri, Some(1), None).await;
            assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED, "HEAD {uri}");
            assert_eq!(res.header("access-control-allow-origin"), "*");
        }
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = TestApp::new().await;
        let huge = "A".repeat(app.state.config.max_request_body + 1);
        let res = app
            .call(
                Method::POST,
                "/upload-avatar",
                None,
                Some(json!({ "image": huge, "user_id": 1 })),
            )
            .await;
        assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
    }
}
