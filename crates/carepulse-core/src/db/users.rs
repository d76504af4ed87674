//! User directory operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{constraint_or, timestamp, Database, DbError, DbResult};
use crate::backend::{BackendResult, UserDirectory};
use crate::models::{NewUser, User};

impl Database {
    /// Insert a new user. Email and phone must be unique.
    pub fn insert_user(&self, id: &str, user: &NewUser) -> DbResult<User> {
        let now = timestamp();
        self.conn
            .execute(
                r#"
                INSERT INTO users (id, name, email, phone, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![id, user.name, user.email, user.phone, now],
            )
            .map_err(|e| {
                constraint_or(e, || {
                    format!(
                        "user with email {} or phone {} already exists",
                        user.email, user.phone
                    )
                })
            })?;

        Ok(User {
            id: id.to_string(),
            created_at: now,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
        })
    }

    /// Get a user by id.
    pub fn find_user(&self, id: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, created_at, name, email, phone FROM users WHERE id = ?",
                [id],
                user_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List users with the given email, oldest first.
    pub fn list_users_by_email(&self, email: &str) -> DbResult<Vec<User>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, created_at, name, email, phone
            FROM users
            WHERE email = ?
            ORDER BY created_at
            "#,
        )?;

        let rows = stmt.query_map([email], user_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        created_at: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
    })
}

impl UserDirectory for Database {
    fn create_user(&self, id: &str, user: &NewUser) -> BackendResult<User> {
        Ok(self.insert_user(id, user)?)
    }

    fn get_user(&self, id: &str) -> BackendResult<User> {
        self.find_user(id)?
            .ok_or_else(|| DbError::NotFound(format!("user {}", id)).into())
    }

    fn find_users_by_email(&self, email: &str) -> BackendResult<Vec<User>> {
        Ok(self.list_users_by_email(email)?)
    }
}
