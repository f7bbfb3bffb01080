//! Database schema and migrations for ScribeVault.
//!
//! Migrations are applied in order when the database is opened. The
//! schema_version table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Folder hierarchy, one tree per owner
    r#"
CREATE TABLE folders (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    TEXT NOT NULL,
    name        TEXT NOT NULL,
    parent_id   INTEGER REFERENCES folders(id),   -- NULL means root
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_folders_owner_id ON folders(owner_id);
CREATE INDEX idx_folders_parent_id ON folders(parent_id);
"#,
    // v2: File records
    r#"
CREATE TABLE files (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id          TEXT NOT NULL,
    original_name     TEXT NOT NULL,
    stored_name       TEXT,                     -- NULL for embedded links
    mime_type         TEXT NOT NULL,
    size              INTEGER NOT NULL DEFAULT 0,
    status            TEXT NOT NULL DEFAULT 'pending',  -- 'pending', 'in-progress', 'transcribed'
    folder_id         INTEGER REFERENCES folders(id),
    service_category  TEXT,
    source_type       TEXT NOT NULL DEFAULT 'file',     -- 'file' or 'url'
    source_url        TEXT,
    description       TEXT,
    uploaded_at       TEXT NOT NULL
);

CREATE INDEX idx_files_owner_id ON files(owner_id);
CREATE INDEX idx_files_folder_id ON files(folder_id);
CREATE INDEX idx_files_status ON files(status);
"#,
];
