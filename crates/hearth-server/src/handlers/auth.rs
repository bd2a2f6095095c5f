//! Sign-in / registration.
//!
//! The identity provider's token has already been verified by the client
//! flow; this handler trusts the payload and upserts the user row keyed by
//! the provider's subject id.

use axum::{extract::State, Json};
use hearth_store::{NewUser, User};
use serde::Deserialize;
use tracing::info;

use super::present;
use crate::api::AppState;
use crate::error::ServerError;
use crate::extract::JsonBody;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    google_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

/// `POST /auth`: create the user on first sign-in, refresh name and avatar
/// afterwards.
pub async fn sign_in(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignInRequest>,
) -> Result<Json<User>, ServerError> {
    let (Some(google_id), Some(email), Some(name)) = (
        present(req.google_id),
        present(req.email),
        present(req.name),
    ) else {
        return Err(ServerError::validation("Missing required fields"));
    };
    let avatar_url = req.avatar_url.unwrap_or_default();

    let user = state
        .with_db(move |db| {
            db.upsert_user(&NewUser {
                google_id: &google_id,
                email: &email,
                name: &name,
                avatar_url: &avatar_url,
            })
        })
        .await?;

    info!(user_id = user.id, google_id = %user.google_id, "User signed in");
    Ok(Json(user))
}
