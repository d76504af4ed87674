//! Contracts for the hosted backend collaborators.
//!
//! The lifecycle manager and the registration flow only ever talk to these
//! traits. [`crate::db::Database`] implements all of them over SQLite; the
//! `carepulse-appwrite` crate implements them over the hosted REST API.

mod document;

pub use document::*;

use thiserror::Error;

use crate::models::{NewUser, User};

/// Errors reported by a backend collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed data: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Malformed(e.to_string())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Schema-less document database.
pub trait DocumentStore {
    /// Create a document with a caller-chosen id.
    fn create_document(&self, collection: &str, id: &str, fields: Fields)
        -> BackendResult<Document>;

    /// Read a document. Missing ids are `BackendError::NotFound`.
    fn get_document(&self, collection: &str, id: &str) -> BackendResult<Document>;

    /// Overwrite the given attributes of an existing document.
    ///
    /// Attributes set to `null` are cleared. Missing ids are
    /// `BackendError::NotFound`.
    fn update_document(&self, collection: &str, id: &str, fields: Fields)
        -> BackendResult<Document>;

    /// List documents matching `query`. `total` counts all matches, ignoring the limit.
    fn list_documents(&self, collection: &str, query: &ListQuery) -> BackendResult<DocumentList>;
}

/// File storage organised in buckets.
pub trait BlobStore {
    fn put_file(
        &self,
        bucket: &str,
        id: &str,
        bytes: &[u8],
        file_name: &str,
    ) -> BackendResult<StoredFile>;
}

/// Outbound text messaging. Returns the id of the queued message.
pub trait MessagingSender {
    fn send_text(&self, recipient_user_ids: &[String], body: &str) -> BackendResult<String>;
}

/// Account directory.
pub trait UserDirectory {
    /// Create an account. Duplicate email or phone is `BackendError::Conflict`.
    fn create_user(&self, id: &str, user: &NewUser) -> BackendResult<User>;

    fn get_user(&self, id: &str) -> BackendResult<User>;

    fn find_users_by_email(&self, email: &str) -> BackendResult<Vec<User>>;
}

/// Generate a fresh backend id (32 lowercase hex chars).
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_shape() {
        let id = unique_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, unique_id());
    }
}
