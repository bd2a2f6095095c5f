//! Operations on [`User`] records.

use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewUser, User};
use crate::time;

const USER_COLUMNS: &str = "id, google_id, email, name, avatar_url, created_at, updated_at";

impl Database {
    /// Insert a user, or refresh the existing row with the same `google_id`.
    ///
    /// A single `INSERT ... ON CONFLICT DO UPDATE` statement, so concurrent
    /// sign-ins of the same identity cannot race.  On conflict only `name`,
    /// `avatar_url` and `updated_at` change; `id`, `email` and `created_at`
    /// keep their original values.
    pub fn upsert_user(&self, user: &NewUser<'_>) -> Result<User> {
        let now = time::now();
        let sql = format!(
            "INSERT INTO users (google_id, email, name, avatar_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (google_id) DO UPDATE SET
                 name = excluded.name,
                 avatar_url = excluded.avatar_url,
                 updated_at = excluded.updated_at
             RETURNING {USER_COLUMNS}"
        );

        let user = self.conn().query_row(
            &sql,
            params![user.google_id, user.email, user.name, user.avatar_url, now],
            row_to_user,
        )?;

        tracing::debug!(user_id = user.id, google_id = %user.google_id, "upserted user");
        Ok(user)
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .map_err(StoreError::from_query)
    }

    pub fn get_user_by_google_id(&self, google_id: &str) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = ?1"),
                params![google_id],
                row_to_user,
            )
            .map_err(StoreError::from_query)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        google_id: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        avatar_url: row.get(4)?,
        created_at: time::column(row, 5)?,
        updated_at: time::column(row, 6)?,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::temp_db;

    fn ann<'a>(name: &'a str, avatar_url: &'a str) -> NewUser<'a> {
        NewUser {
            google_id: "g1",
            email: "a@x.com",
            name,
            avatar_url,
        }
    }

    #[test]
    fn first_upsert_inserts() {
        let (db, _dir) = temp_db();
        let user = db.upsert_user(&ann("Ann", "https://img/a.png")).unwrap();

        assert_eq!(user.google_id, "g1");
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.name, "Ann");
        assert_eq!(user.avatar_url, "https://img/a.png");
        assert_eq!(user.created_at, user.updated_at);
        assert_eq!(db.get_user(user.id).unwrap(), user);
    }

    #[test]
    fn second_upsert_updates_name_and_keeps_identity() {
        let (db, _dir) = temp_db();
        let first = db.upsert_user(&ann("Ann", "")).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = db
            .upsert_user(&NewUser {
                email: "changed@x.com",
                ..ann("Ann2", "https://img/new.png")
            })
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Ann2");
        assert_eq!(second.avatar_url, "https://img/new.png");
        assert_eq!(second.email, "a@x.com", "email is not overwritten");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn distinct_identities_get_distinct_rows() {
        let (db, _dir) = temp_db();
        let a = test_support::seed_user(&db, 1);
        let b = test_support::seed_user(&db, 2);
        assert_ne!(a, b);
        assert_eq!(db.get_user_by_google_id("g2").unwrap().id, b);
    }

    #[test]
    fn missing_user_is_not_found() {
        let (db, _dir) = temp_db();
        assert!(matches!(db.get_user(42), Err(StoreError::NotFound)));
        assert!(matches!(
            db.get_user_by_google_id("nobody"),
            Err(StoreError::NotFound)
        ));
    }
}
