//! libSQL-backed report store.
//!
//! Holds cache entries and a run history table in a single local database.
//! Read-only handles (for inspection tools) reject writes.

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use jobsignal_shared::{InputFingerprint, JobSignalError, Result, RunId};

use crate::ReportStore;
use crate::entry::{Artifact, CacheEntry, GenerationParams, StoreKey};
use crate::migrations;

fn storage_err(e: impl std::fmt::Display) -> JobSignalError {
    JobSignalError::Storage(e.to_string())
}

/// A finished run as recorded in the history table.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: String,
    pub scope: String,
    pub finished_at: DateTime<Utc>,
    pub stats_json: String,
}

pub struct SqlReportStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl SqlReportStore {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JobSignalError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let store = Self {
            db,
            conn,
            readonly: false,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an existing database without migrating; writes are rejected.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;
        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current = self.schema_version().await;
        for migration in migrations::all_migrations() {
            if migration.version > current {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        JobSignalError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn schema_version(&self) -> u32 {
        match self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await
        {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(JobSignalError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    pub async fn record_run(&self, run_id: &RunId, scope: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO runs (id, scope, finished_at, stats_json) VALUES (?1, ?2, ?3, ?4)",
                params![
                    run_id.to_string(),
                    scope,
                    Utc::now().to_rfc3339(),
                    stats_json
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Runs for `scope`, newest first.
    pub async fn list_runs(&self, scope: &str) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, scope, finished_at, stats_json FROM runs
                 WHERE scope = ?1 ORDER BY finished_at DESC",
                params![scope],
            )
            .await
            .map_err(storage_err)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let finished: String = row.get(2).map_err(storage_err)?;
            runs.push(RunRecord {
                id: row.get(0).map_err(storage_err)?,
                scope: row.get(1).map_err(storage_err)?,
                finished_at: parse_timestamp(&finished)?,
                stats_json: row.get(3).map_err(storage_err)?,
            });
        }
        Ok(runs)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| JobSignalError::Storage(format!("invalid timestamp '{raw}': {e}")))
}

impl ReportStore for SqlReportStore {
    async fn load(&self, key: &StoreKey) -> Result<Option<CacheEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT schema_version, input_fingerprint, artifact_json, generation_params_json, created_at
                 FROM cache_entries WHERE key = ?1",
                params![key.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };

        let schema_version: u32 = row.get(0).map_err(storage_err)?;
        let fingerprint: String = row.get(1).map_err(storage_err)?;
        let artifact_json: String = row.get(2).map_err(storage_err)?;
        let params_json: Option<String> = row.get(3).map_err(storage_err)?;
        let created_at: String = row.get(4).map_err(storage_err)?;

        let decoded = decode_row(
            key,
            schema_version,
            fingerprint,
            &artifact_json,
            params_json.as_deref(),
            &created_at,
        );
        match decoded {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(%key, error = %e, "ignoring unreadable cache row");
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &StoreKey, entry: &CacheEntry) -> Result<()> {
        self.check_writable()?;
        let artifact_json = serde_json::to_string(&entry.artifact).map_err(storage_err)?;
        let params_json = entry
            .generation_params
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(storage_err)?;

        self.conn
            .execute(
                "INSERT INTO cache_entries
                   (key, schema_version, input_fingerprint, artifact_json, generation_params_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(key) DO UPDATE SET
                   schema_version = excluded.schema_version,
                   input_fingerprint = excluded.input_fingerprint,
                   artifact_json = excluded.artifact_json,
                   generation_params_json = excluded.generation_params_json,
                   created_at = excluded.created_at",
                params![
                    key.as_str(),
                    i64::from(entry.schema_version),
                    entry.input_fingerprint.as_str(),
                    artifact_json,
                    params_json,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;

        debug!(%key, "cache row saved");
        Ok(())
    }
}

fn decode_row(
    key: &StoreKey,
    schema_version: u32,
    fingerprint: String,
    artifact_json: &str,
    params_json: Option<&str>,
    created_at: &str,
) -> Result<CacheEntry> {
    let corrupt = |msg: String| JobSignalError::cache_corrupt(key.as_str(), msg);

    if schema_version != crate::entry::CACHE_SCHEMA_VERSION {
        return Err(corrupt(format!("schema version {schema_version}")));
    }
    let artifact: Artifact =
        serde_json::from_str(artifact_json).map_err(|e| corrupt(e.to_string()))?;
    let generation_params: Option<GenerationParams> = params_json
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;
    let created_at = parse_timestamp(created_at).map_err(|e| corrupt(e.to_string()))?;

    Ok(CacheEntry {
        schema_version,
        input_fingerprint: InputFingerprint::from_hex(fingerprint),
        artifact,
        created_at,
        generation_params,
    })
}
