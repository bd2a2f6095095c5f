//! HTTP handlers.  Each one is independent: they share nothing but the
//! database schema and the [`AppState`](crate::api::AppState) configuration.

pub mod auth;
pub mod avatar;
pub mod chats;

use crate::error::ServerError;

/// Fallback for methods a route does not serve.
pub async fn method_not_allowed() -> ServerError {
    ServerError::MethodNotAllowed
}

/// Treat absent and empty strings alike.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
