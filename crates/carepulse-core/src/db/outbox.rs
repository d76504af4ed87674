//! SMS outbox: messages queued for delivery by an external gateway.

use rusqlite::params;

use super::{timestamp, Database, DbError, DbResult};
use crate::backend::{unique_id, BackendResult, MessagingSender};

/// A queued text message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: String,
    pub recipients: Vec<String>,
    pub body: String,
    pub created_at: String,
}

impl Database {
    /// Queue a text message.
    pub fn enqueue_sms(&self, recipients: &[String], body: &str) -> DbResult<String> {
        let id = unique_id();
        let recipients_json = serde_json::to_string(recipients)?;

        self.conn.execute(
            r#"
            INSERT INTO sms_outbox (id, recipients, body, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![id, recipients_json, body, timestamp()],
        )?;
        Ok(id)
    }

    /// All queued messages, oldest first.
    pub fn list_outbox(&self) -> DbResult<Vec<OutboxMessage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, recipients, body, created_at
            FROM sms_outbox
            ORDER BY seq
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(OutboxRow {
                id: row.get(0)?,
                recipients: row.get(1)?,
                body: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?.try_into()?);
        }
        Ok(messages)
    }
}

impl MessagingSender for Database {
    fn send_text(&self, recipient_user_ids: &[String], body: &str) -> BackendResult<String> {
        Ok(self.enqueue_sms(recipient_user_ids, body)?)
    }
}

/// Intermediate row struct for database mapping.
struct OutboxRow {
    id: String,
    recipients: String,
    body: String,
    created_at: String,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = DbError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxMessage {
            id: row.id,
            recipients: serde_json::from_str(&row.recipients)?,
            body: row.body,
            created_at: row.created_at,
        })
    }
}
