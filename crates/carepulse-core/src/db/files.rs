//! File storage operations.

use rusqlite::{params, OptionalExtension};

use super::{constraint_or, timestamp, Database, DbResult};
use crate::backend::{BackendResult, BlobStore, StoredFile};

impl Database {
    /// Store a file in a bucket.
    pub fn insert_file(
        &self,
        bucket: &str,
        id: &str,
        bytes: &[u8],
        file_name: &str,
    ) -> DbResult<StoredFile> {
        let now = timestamp();
        self.conn
            .execute(
                r#"
                INSERT INTO files (bucket, id, name, size_bytes, content, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![bucket, id, file_name, bytes.len() as i64, bytes, now],
            )
            .map_err(|e| constraint_or(e, || format!("file {} already exists in {}", id, bucket)))?;

        Ok(StoredFile {
            id: id.to_string(),
            bucket_id: bucket.to_string(),
            name: file_name.to_string(),
            size_bytes: bytes.len() as u64,
            created_at: now,
        })
    }

    /// Read a file's content.
    pub fn get_file_content(&self, bucket: &str, id: &str) -> DbResult<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT content FROM files WHERE bucket = ? AND id = ?",
                [bucket, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }
}

impl BlobStore for Database {
    fn put_file(
        &self,
        bucket: &str,
        id: &str,
        bytes: &[u8],
        file_name: &str,
    ) -> BackendResult<StoredFile> {
        Ok(self.insert_file(bucket, id, bytes, file_name)?)
    }
}
