//! # hearth-store
//!
//! Relational storage for the Hearth messaging backend, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for users, chats,
//! chat memberships and messages.  Handlers open one handle per request and
//! drop it when the request is done; nothing here is shared between
//! requests.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;
mod time;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
