//! SQL migrations for the libSQL report store.
//!
//! Applied in ascending order when the store is opened read-write.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "cache entries",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cache_entries (
    key                    TEXT PRIMARY KEY,
    schema_version         INTEGER NOT NULL,
    input_fingerprint      TEXT NOT NULL,
    artifact_json          TEXT NOT NULL,
    generation_params_json TEXT,
    created_at             TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "run history",
            sql: r#"
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    scope       TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    stats_json  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_scope ON runs(scope);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
