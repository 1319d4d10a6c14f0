//! Inline SQL migrations for the session index schema.
//!
//! Simple inline migrations rather than sqlx migration files — the
//! schema is small and self-contained. Each entry is applied at most
//! once, tracked by `schema_meta` (see `Database::run_migrations`).
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: sessions
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    harness TEXT NOT NULL,
    project_path TEXT NOT NULL DEFAULT '',
    project_name TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    first_prompt TEXT NOT NULL DEFAULT '',
    last_prompt TEXT NOT NULL DEFAULT '',
    last_response TEXT NOT NULL DEFAULT '',
    created_time INTEGER,
    modified_time INTEGER,
    is_child INTEGER NOT NULL DEFAULT 0,
    child_type TEXT NOT NULL DEFAULT '',
    parent_id TEXT REFERENCES sessions(id) ON DELETE SET NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    turn_count INTEGER NOT NULL DEFAULT 0,
    first_prompt_preview TEXT,
    raw_path TEXT NOT NULL DEFAULT '',
    file_mtime INTEGER,
    indexed_at INTEGER,
    auto_tags TEXT NOT NULL DEFAULT '[]'
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_path);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_harness ON sessions(harness);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_parent ON sessions(parent_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_modified ON sessions(modified_time DESC);"#,
    // Migration: messages
    r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT NOT NULL,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    timestamp INTEGER,
    sequence INTEGER NOT NULL,
    has_code INTEGER NOT NULL DEFAULT 0,
    tool_mentions TEXT,
    PRIMARY KEY (session_id, sequence)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_id ON messages(id);"#,
    // Migration: chunks
    r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    message_id TEXT,
    chunk_index INTEGER NOT NULL,
    chunk_type TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    embedding_model TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (session_id, chunk_index)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_chunks_session ON chunks(session_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_chunks_embedding_model ON chunks(embedding_model);"#,
    // Migration: summaries
    r#"
CREATE TABLE IF NOT EXISTS summaries (
    session_id TEXT PRIMARY KEY REFERENCES sessions(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    model TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
"#,
    // Migration: project_stats
    r#"
CREATE TABLE IF NOT EXISTS project_stats (
    project_path TEXT PRIMARY KEY,
    project_name TEXT NOT NULL DEFAULT '',
    total_sessions INTEGER NOT NULL DEFAULT 0,
    parent_sessions INTEGER NOT NULL DEFAULT 0,
    child_sessions INTEGER NOT NULL DEFAULT 0,
    first_session_time INTEGER,
    last_session_time INTEGER,
    harness_counts TEXT NOT NULL DEFAULT '{}',
    total_messages INTEGER NOT NULL DEFAULT 0,
    common_tags TEXT NOT NULL DEFAULT '[]',
    updated_at INTEGER NOT NULL
);
"#,
    // Migration: search_log
    r#"
CREATE TABLE IF NOT EXISTS search_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    result_count INTEGER NOT NULL,
    top_session_ids TEXT NOT NULL DEFAULT '[]',
    elapsed_ms INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);
"#,
    // Migration: key/value metadata store
    r#"
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
    // Migration: messages_fts — external-content FTS5 table over messages.content
    r#"
CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    content,
    content = 'messages',
    content_rowid = 'rowid',
    tokenize = 'porter unicode61 remove_diacritics 1'
);
"#,
    // messages has no integer rowid alias (composite PK), so the FTS external-content
    // table is keyed on sqlite's implicit `rowid` and triggers re-derive it per row.
    r#"
CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
END;
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
END;
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS messages_au AFTER UPDATE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
    INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
END;
"#,
    // Migration: sessions_fts — first_prompt_preview + project_name + auto_tags
    r#"
CREATE VIRTUAL TABLE IF NOT EXISTS sessions_fts USING fts5(
    first_prompt_preview,
    project_name,
    auto_tags,
    content = 'sessions',
    content_rowid = 'rowid',
    tokenize = 'porter unicode61 remove_diacritics 1'
);
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS sessions_ai AFTER INSERT ON sessions BEGIN
    INSERT INTO sessions_fts(rowid, first_prompt_preview, project_name, auto_tags)
    VALUES (new.rowid, new.first_prompt_preview, new.project_name, new.auto_tags);
END;
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS sessions_ad AFTER DELETE ON sessions BEGIN
    INSERT INTO sessions_fts(sessions_fts, rowid, first_prompt_preview, project_name, auto_tags)
    VALUES ('delete', old.rowid, old.first_prompt_preview, old.project_name, old.auto_tags);
END;
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS sessions_au AFTER UPDATE ON sessions BEGIN
    INSERT INTO sessions_fts(sessions_fts, rowid, first_prompt_preview, project_name, auto_tags)
    VALUES ('delete', old.rowid, old.first_prompt_preview, old.project_name, old.auto_tags);
    INSERT INTO sessions_fts(rowid, first_prompt_preview, project_name, auto_tags)
    VALUES (new.rowid, new.first_prompt_preview, new.project_name, new.auto_tags);
END;
"#,
];
