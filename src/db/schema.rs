/// Schema for the task snapshot store.
pub const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Schema for cache buckets.
pub const CACHE_SCHEMA: &str = r#"
-- One row per cached request, grouped by bucket (cache name)
CREATE TABLE IF NOT EXISTS cache_entries (
    bucket TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_bucket ON cache_entries(bucket);

-- Buckets exist independently of their entries (an installed but empty cache is still a cache)
CREATE TABLE IF NOT EXISTS cache_buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
