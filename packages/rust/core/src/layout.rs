//! Persisted run layout.
//!
//! ```text
//! <output_dir>/<run_id>/
//! ├── postings/
//! │   ├── 001_service-desk-analyst-acme.json
//! │   └── ...
//! ├── postings.jsonl        (first line is `{"_meta": {...}}`)
//! ├── analysis_report.json
//! ├── run.json
//! └── summary.txt           (only when a summary is available)
//! ```
//!
//! Every file is written to a temp name and renamed into place.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use jobsignal_shared::{AnalysisReport, JobSignalError, Posting, Result, RunId};

use crate::pipeline::RunStats;

const SLUG_MAX_CHARS: usize = 60;

/// Everything one run writes to disk.
#[derive(Debug, Clone, Copy)]
pub struct RunLayout<'a> {
    pub run_id: &'a RunId,
    pub scope: &'a str,
    pub postings: &'a [Posting],
    pub report: &'a AnalysisReport,
    pub stats: &'a RunStats,
    pub summary: Option<&'a str>,
}

#[derive(Serialize)]
struct ListingMeta<'a> {
    run_id: String,
    scope: &'a str,
    written_at: String,
    total_postings: usize,
    catalog_version: &'a str,
}

#[derive(Serialize)]
struct MetaLine<'a> {
    #[serde(rename = "_meta")]
    meta: ListingMeta<'a>,
}

/// Write the run directory and return its path.
#[instrument(skip_all, fields(run_id = %layout.run_id, postings = layout.postings.len()))]
pub fn write_run_layout(output_dir: &Path, layout: &RunLayout<'_>) -> Result<PathBuf> {
    let run_dir = output_dir.join(layout.run_id.to_string());
    let postings_dir = run_dir.join("postings");
    std::fs::create_dir_all(&postings_dir).map_err(|e| JobSignalError::io(&postings_dir, e))?;

    for (i, posting) in layout.postings.iter().enumerate() {
        let name = format!("{:03}_{}.json", i + 1, posting_slug(posting));
        write_json(&postings_dir.join(name), posting)?;
    }

    write_atomic(&run_dir.join("postings.jsonl"), listing_jsonl(layout)?.as_bytes())?;
    write_json(&run_dir.join("analysis_report.json"), layout.report)?;
    write_json(&run_dir.join("run.json"), layout.stats)?;
    if let Some(summary) = layout.summary {
        write_atomic(&run_dir.join("summary.txt"), summary.as_bytes())?;
    }

    info!(path = %run_dir.display(), "run layout written");
    Ok(run_dir)
}

fn listing_jsonl(layout: &RunLayout<'_>) -> Result<String> {
    let meta = MetaLine {
        meta: ListingMeta {
            run_id: layout.run_id.to_string(),
            scope: layout.scope,
            written_at: Utc::now().to_rfc3339(),
            total_postings: layout.postings.len(),
            catalog_version: &layout.report.meta.catalog_version,
        },
    };

    let mut out = to_json_line(&meta)?;
    for posting in layout.postings {
        out.push_str(&to_json_line(posting)?);
    }
    Ok(out)
}

fn to_json_line<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut line = serde_json::to_string(value)
        .map_err(|e| JobSignalError::validation(format!("JSON serialization failed: {e}")))?;
    line.push('\n');
    Ok(line)
}

/// Filesystem-safe slug from a posting's title and company.
pub fn posting_slug(posting: &Posting) -> String {
    let source = format!("{} {}", posting.title, posting.company);
    let mut slug = String::with_capacity(source.len());
    let mut pending_dash = false;

    for c in source.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
            if slug.len() >= SLUG_MAX_CHARS {
                break;
            }
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "posting".to_string()
    } else {
        slug
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| JobSignalError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, json.as_bytes())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{name}.{}.tmp", Uuid::now_v7()));

    std::fs::write(&temp, bytes).map_err(|e| JobSignalError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(JobSignalError::io(path, e));
    }

    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}
