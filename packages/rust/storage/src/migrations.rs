//! SQL migration definitions for the Keywatch evidence cache database.
//!
//! Migrations are applied in order on database open.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: evidence_cache",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Provider results per (provider, term, recency, region) key
CREATE TABLE IF NOT EXISTS evidence_cache (
    cache_key    TEXT PRIMARY KEY,
    provider     TEXT NOT NULL,
    term         TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at   INTEGER NOT NULL,
    ttl_secs     INTEGER NOT NULL,
    expires_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_evidence_cache_expires ON evidence_cache(expires_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
