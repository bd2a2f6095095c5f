//! Domain model structs persisted in the relational database.
//!
//! Every struct derives `Serialize` so handlers can return it directly as a
//! JSON response body.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat type used when a create request does not name one.
pub const DEFAULT_CHAT_TYPE: &str = "group";

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user, keyed externally by the sign-in provider's id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Surrogate key.
    pub id: i64,
    /// Identity provider's stable subject id.  Never changes once stored.
    pub google_id: String,
    pub email: String,
    /// Display name, overwritten on every sign-in.
    pub name: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Database::upsert_user`](crate::Database::upsert_user).
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub google_id: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub avatar_url: &'a str,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation (direct or group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
    pub name: String,
    pub avatar_url: String,
    /// Free-form tag, conventionally `direct` or `group`.
    pub chat_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Database::create_chat`](crate::Database::create_chat).
#[derive(Debug, Clone)]
pub struct NewChat<'a> {
    pub name: &'a str,
    pub avatar_url: &'a str,
    pub chat_type: &'a str,
}

/// One row of a user's chat list: the chat plus a preview of its latest
/// message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: i64,
    pub name: String,
    pub avatar_url: String,
    pub chat_type: String,
    pub created_at: DateTime<Utc>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// Role of a user within a chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(MemberRole::Admin),
            "member" => Ok(MemberRole::Member),
            other => Err(format!("unknown member role: {other}")),
        }
    }
}

/// A membership row linking one user to one chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMember {
    pub chat_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A chat message.  The handlers only ever read the latest one per chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    /// `None` once the sender's user row is gone.
    pub sender_id: Option<i64>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_role_round_trips_through_text() {
        for role in [MemberRole::Admin, MemberRole::Member] {
            assert_eq!(role.as_str().parse::<MemberRole>().unwrap(), role);
        }
        assert!("owner".parse::<MemberRole>().is_err());
    }
}
