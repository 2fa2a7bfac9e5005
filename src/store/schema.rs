//! Database schema definitions for the article store.
//!
//! Contains SQL schema and migration logic. Deletion cascades from
//! documents through chunks to embeddings, so a per-article replacement
//! or a run purge can never strand an embedding row.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for initial database setup.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Indexed help articles; at most one current revision per (repo, path)
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_slug TEXT NOT NULL,
    path TEXT NOT NULL,
    title TEXT,
    commit_sha TEXT NOT NULL,
    content TEXT NOT NULL,
    indexed_at INTEGER NOT NULL,
    UNIQUE(repo_slug, path)
);

-- Index for article lookup by path suffix
CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path);

-- Bounded slices of article content
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    section_heading TEXT,
    source_type TEXT NOT NULL DEFAULT 'article',
    index_run_id TEXT NOT NULL,
    retrieval_program_version TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);

-- Index for chunk ordering within an article
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, ordinal);

-- Index for bulk purge by indexing run
CREATE INDEX IF NOT EXISTS idx_chunks_run ON chunks(index_run_id);

-- One embedding per chunk (f64 array serialized little-endian)
CREATE TABLE IF NOT EXISTS chunk_embeddings (
    chunk_id INTEGER PRIMARY KEY,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model_name TEXT NOT NULL,
    FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
);

-- FTS5 virtual table for BM25 keyword search
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    content,
    content='chunks',
    content_rowid='id',
    tokenize='porter unicode61'
);

-- Triggers to keep FTS5 index in sync with chunks table
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, content) VALUES (new.id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES('delete', old.id, old.content);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES('delete', old.id, old.content);
    INSERT INTO chunks_fts(chunks_fts, rowid, content) VALUES (new.id, new.content);
END;

-- User feedback on answers
CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id TEXT NOT NULL,
    label TEXT NOT NULL,
    user_id TEXT NOT NULL,
    source TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Index for feedback lookup by request
CREATE INDEX IF NOT EXISTS idx_feedback_request ON feedback(request_id);

-- Per-request replay log
CREATE TABLE IF NOT EXISTS qa_logs (
    request_id TEXT PRIMARY KEY,
    team_id TEXT,
    channel_id TEXT,
    thread_ts TEXT,
    question TEXT NOT NULL,
    answer TEXT,
    citations TEXT,
    confidence TEXT,
    latency_ms INTEGER,
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
";

/// SQL to check if the schema is initialized.
pub const CHECK_SCHEMA_SQL: &str = r"
SELECT COUNT(*) FROM sqlite_master
WHERE type='table' AND name='schema_info';
";

/// SQL to get the schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set the schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?);
";
