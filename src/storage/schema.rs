//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Agency Harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    summary TEXT
);

-- SeenSet: every URL the ledger has committed, never pruned
CREATE TABLE IF NOT EXISTS seen_urls (
    url TEXT PRIMARY KEY,
    checksum TEXT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    seen_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_seen_urls_checksum ON seen_urls(checksum);

-- Downloaded artifacts, one row per distinct content checksum
CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    checksum TEXT NOT NULL UNIQUE,
    local_path TEXT NOT NULL,
    section TEXT NOT NULL,
    year_bucket TEXT NOT NULL,
    source_url TEXT NOT NULL,
    stored_at TEXT NOT NULL
);

-- Document records, upserted by source URL
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT '',
    series_id TEXT NOT NULL DEFAULT '',
    reference_id TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    date TEXT NOT NULL DEFAULT '',
    run_id INTEGER NOT NULL REFERENCES runs(id),
    recorded_at TEXT NOT NULL
);

-- Which artifacts belong to which document
CREATE TABLE IF NOT EXISTS document_artifacts (
    document_url TEXT NOT NULL REFERENCES documents(url),
    checksum TEXT NOT NULL REFERENCES artifacts(checksum),
    PRIMARY KEY (document_url, checksum)
);

-- URLs that failed after retries
CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    stage TEXT NOT NULL,
    message TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failures_run ON failures(run_id);

-- Isolated segments (malformed sitemaps, feeds, unparsable pages)
CREATE TABLE IF NOT EXISTS skips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    reason TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_skips_run ON skips(run_id);

-- Resumable traversal cursors
CREATE TABLE IF NOT EXISTS cursors (
    authority TEXT NOT NULL,
    strategy TEXT NOT NULL,
    cursor TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (authority, strategy)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
