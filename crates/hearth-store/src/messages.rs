use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;
use crate::time;

impl Database {
    pub fn insert_message(
        &self,
        chat_id: i64,
        sender_id: Option<i64>,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Message> {
        self.conn()
            .query_row(
                "INSERT INTO messages (chat_id, sender_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id, chat_id, sender_id, text, created_at",
                params![chat_id, sender_id, text, time::encode(created_at)],
                row_to_message,
            )
            .map_err(StoreError::Sqlite)
    }

    /// The most recent message of a chat, if it has any.
    pub fn latest_message(&self, chat_id: i64) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                "SELECT id, chat_id, sender_id, text, created_at
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                params![chat_id],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        created_at: time::column(row, 4)?,
    })
}
