//! SQLite schema definition.

/// Complete database schema for the local backend.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Documents (schema-less, one row per document)
-- ============================================================================

CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,       -- insertion order, breaks timestamp ties
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{}',             -- JSON object of user attributes
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_created ON documents(collection, created_at);

-- ============================================================================
-- Files
-- ============================================================================

CREATE TABLE IF NOT EXISTS files (
    bucket TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (bucket, id)
);

-- ============================================================================
-- Users
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- ============================================================================
-- SMS Outbox (append-only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS sms_outbox (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    recipients TEXT NOT NULL,                    -- JSON array of user ids
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;
