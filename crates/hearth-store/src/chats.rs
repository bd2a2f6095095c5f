//! Operations on [`Chat`] records and their memberships.

use rusqlite::{params, TransactionBehavior};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatMember, ChatSummary, MemberRole, NewChat};
use crate::time;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a chat and its memberships in one transaction.
    ///
    /// `creator_id` joins as [`MemberRole::Admin`], every id in
    /// `member_ids` as [`MemberRole::Member`].  Membership inserts use
    /// `ON CONFLICT DO NOTHING`, so repeated ids (including the creator's
    /// own) are ignored.  If any insert fails, e.g. on an unknown user id,
    /// the transaction is rolled back and no chat row survives.
    pub fn create_chat(
        &mut self,
        chat: &NewChat<'_>,
        creator_id: i64,
        member_ids: &[i64],
    ) -> Result<Chat> {
        let now = time::now();
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let created = tx.query_row(
            "INSERT INTO chats (name, avatar_url, chat_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             RETURNING id, name, avatar_url, chat_type, created_at, updated_at",
            params![chat.name, chat.avatar_url, chat.chat_type, now],
            row_to_chat,
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO chat_members (chat_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (chat_id, user_id) DO NOTHING",
            )?;

            let members = std::iter::once((creator_id, MemberRole::Admin))
                .chain(member_ids.iter().map(|&id| (id, MemberRole::Member)));
            for (user_id, role) in members {
                insert.execute(params![created.id, user_id, role.as_str(), now])?;
            }
        }

        tx.commit()?;

        tracing::debug!(
            chat_id = created.id,
            creator_id,
            requested_members = member_ids.len(),
            "created chat"
        );
        Ok(created)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_chat(&self, id: i64) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT id, name, avatar_url, chat_type, created_at, updated_at
                 FROM chats
                 WHERE id = ?1",
                params![id],
                row_to_chat,
            )
            .map_err(StoreError::from_query)
    }

    /// Every chat `user_id` belongs to, with a preview of its latest message.
    ///
    /// Ordered by latest message time descending; chats without messages
    /// come last.  The latest message is looked up per row so the preview is
    /// always the true latest.
    pub fn list_chats_for_user(&self, user_id: i64) -> Result<Vec<ChatSummary>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.name, c.avatar_url, c.chat_type, c.created_at,
                    (SELECT m.text FROM messages m
                      WHERE m.chat_id = c.id
                      ORDER BY m.created_at DESC, m.id DESC LIMIT 1) AS last_message,
                    (SELECT m.created_at FROM messages m
                      WHERE m.chat_id = c.id
                      ORDER BY m.created_at DESC, m.id DESC LIMIT 1) AS last_message_time
             FROM chats c
             JOIN chat_members cm ON cm.chat_id = c.id
             WHERE cm.user_id = ?1
             ORDER BY last_message_time DESC NULLS LAST, c.id DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ChatSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                avatar_url: row.get(2)?,
                chat_type: row.get(3)?,
                created_at: time::column(row, 4)?,
                last_message: row.get(5)?,
                last_message_time: time::opt_column(row, 6)?,
            })
        })?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Membership rows of a chat, admins first.
    pub fn list_members(&self, chat_id: i64) -> Result<Vec<ChatMember>> {
        let mut stmt = self.conn().prepare(
            "SELECT chat_id, user_id, role, joined_at
             FROM chat_members
             WHERE chat_id = ?1
             ORDER BY role = 'admin' DESC, user_id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id], |row| {
            let role: String = row.get(2)?;
            let role = role.parse::<MemberRole>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?;
            Ok(ChatMember {
                chat_id: row.get(0)?,
                user_id: row.get(1)?,
                role,
                joined_at: time::column(row, 3)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Advance a chat's `updated_at`.  This is all the chat "delete" does:
    /// the row, its memberships and its messages stay in place.  Returns
    /// `true` if the chat exists.
    pub fn touch_chat(&self, id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
            params![time::now(), id],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar_url: row.get(2)?,
        chat_type: row.get(3)?,
        created_at: time::column(row, 4)?,
        updated_at: time::column(row, 5)?,
    })
}
