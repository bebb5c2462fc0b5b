// SPDX-License-Identifier: MPL-2.0

/// SQL schema for the document database
pub const SCHEMA: &str = r#"
-- Database version for migrations
PRAGMA user_version = 1;

-- documents: one JSON object per (collection, id)
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at);
"#;
