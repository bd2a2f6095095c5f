//! Chat listing, creation and "deletion".
//!
//! Every route requires the caller's id in `X-User-Id`; see [`CallerId`].

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use hearth_store::{Chat, ChatSummary, NewChat, DEFAULT_CHAT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::present;
use crate::api::AppState;
use crate::error::ServerError;
use crate::extract::{CallerId, JsonBody};

/// `GET /chats`: the caller's chats, most recently active first.
pub async fn list(
    CallerId(user_id): CallerId,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatSummary>>, ServerError> {
    let chats = state
        .with_db(move |db| db.list_chats_for_user(user_id))
        .await?;

    debug!(user_id, count = chats.len(), "Listed chats");
    Ok(Json(chats))
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    name: Option<String>,
    chat_type: Option<String>,
    avatar_url: Option<String>,
    member_ids: Option<Vec<Value>>,
}

/// `POST /chats`: create a chat with the caller as admin.
pub async fn create(
    CallerId(user_id): CallerId,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateChatRequest>,
) -> Result<(StatusCode, Json<Chat>), ServerError> {
    let member_ids = parse_member_ids(req.member_ids.as_deref().unwrap_or_default())?;
    let name = req.name.unwrap_or_default();
    let avatar_url = req.avatar_url.unwrap_or_default();
    let chat_type = present(req.chat_type).unwrap_or_else(|| DEFAULT_CHAT_TYPE.to_string());

    let chat = state
        .with_db(move |db| {
            db.create_chat(
                &NewChat {
                    name: &name,
                    avatar_url: &avatar_url,
                    chat_type: &chat_type,
                },
                user_id,
                &member_ids,
            )
        })
        .await?;

    info!(chat_id = chat.id, user_id, chat_type = %chat.chat_type, "Chat created");
    Ok((StatusCode::CREATED, Json(chat)))
}

#[derive(Debug, Deserialize)]
pub struct DeleteChatParams {
    chat_id: Option<String>,
}

/// `DELETE /chats?chat_id=N`: bump the chat's `updated_at`.
///
/// Nothing is removed: the chat, its members and its messages stay as they
/// were and the chat keeps showing up in listings.
pub async fn delete(
    CallerId(user_id): CallerId,
    State(state): State<AppState>,
    params: Option<Query<DeleteChatParams>>,
) -> Result<Json<Value>, ServerError> {
    let raw = params
        .and_then(|Query(p)| present(p.chat_id))
        .ok_or_else(|| ServerError::validation("Missing chat_id"))?;
    let chat_id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ServerError::validation("Invalid chat_id"))?;

    let existed = state.with_db(move |db| db.touch_chat(chat_id)).await?;

    info!(chat_id, user_id, existed, "Chat marked deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Turn the requested member list into user ids.
///
/// Entries may be numbers or numeric strings.  `null`, `0` and `""` are
/// skipped; anything else that is not an id rejects the request.
fn parse_member_ids(values: &[Value]) -> Result<Vec<i64>, ServerError> {
    let mut ids = Vec::with_capacity(values.len());
    for value in values {
        let id = match value {
            Value::Null => continue,
            Value::String(s) if s.trim().is_empty() => continue,
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        };
        match id {
            Some(0) => continue,
            Some(id) => ids.push(id),
            None => return Err(ServerError::validation("Invalid member_ids")),
        }
    }
    Ok(ids)
}
