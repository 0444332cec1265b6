//! SQL DDL for all rudder tables.
//!
//! Defines the `insights` and `model_stats` tables. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for rudder's core tables.
const SCHEMA_SQL: &str = r#"
-- One row per answered query
CREATE TABLE IF NOT EXISTS insights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL UNIQUE,
    model_name TEXT NOT NULL,
    query TEXT NOT NULL,
    response TEXT NOT NULL,
    feedback_rating REAL CHECK(feedback_rating IS NULL OR (feedback_rating >= 1.0 AND feedback_rating <= 5.0)),
    feedback_type TEXT,
    context TEXT NOT NULL,
    tags TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_insights_model ON insights(model_name);
CREATE INDEX IF NOT EXISTS idx_insights_created ON insights(created_at);

-- Per-model, per-query-type performance statistics (derived from insights,
-- persisted so warm starts skip the full recomputation)
CREATE TABLE IF NOT EXISTS model_stats (
    model_name TEXT NOT NULL,
    query_type TEXT NOT NULL,
    ewma REAL NOT NULL,
    sample_count INTEGER NOT NULL,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (model_name, query_type)
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
