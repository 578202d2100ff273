//! End-to-end run: stubs → detail fetch → dedupe → analysis → summary → layout.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use jobsignal_analyzer::{Analyzer, Catalog};
use jobsignal_dedupe::{DedupeConfig, DedupeStats, dedupe};
use jobsignal_fetch::{
    CancelFlag, FetchProgress, FetchResult, FetchStatus, Fetcher, fetch_all,
};
use jobsignal_shared::{
    AnalysisReport, CacheStatus, JobSignalError, Posting, Result, RunConfig, RunId,
    SummaryConfig,
};
use jobsignal_storage::{
    Artifact, CacheEntry, ReportStore, StoreKey, compute_input_fingerprint, resolve,
};

use crate::layout::{RunLayout, write_run_layout};
use crate::summary::{SUMMARY_ARTIFACT, SummaryOutcome, TextGenerator, summarize};

/// Artifact name for cached analysis reports.
pub const REPORT_ARTIFACT: &str = "analysis_report";

/// Inputs for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Listing stubs, possibly already carrying full descriptions.
    pub stubs: Vec<Posting>,
    pub config: RunConfig,
    pub catalog: Catalog,
    /// Reporting scope the cached artifacts are keyed under.
    pub cache_scope: String,
    /// Listing sites to keep (case-insensitive). Empty keeps all.
    pub sources: Vec<String>,
    /// Generate a summary when set and a generator is supplied.
    pub summary: Option<SummaryConfig>,
}

/// Counters for a finished run. Written as `run.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub stubs: usize,
    pub filtered_out: usize,
    pub requested: usize,
    pub fetched: usize,
    pub failed: usize,
    pub not_fetched: usize,
    pub retries: u64,
    pub url_duplicates: usize,
    pub content_duplicates: usize,
    pub surviving: usize,
    pub postings_without_text: usize,
    /// Cancellation or the run deadline left details unfetched.
    pub partial: bool,
    pub elapsed_ms: u64,
}

/// Result of [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub scope: String,
    /// Deduplicated postings in input order.
    pub postings: Vec<Posting>,
    pub report: AnalysisReport,
    /// Cache status of the report before this run touched it.
    pub report_status: CacheStatus,
    pub report_reused: bool,
    pub summary: Option<SummaryOutcome>,
    pub stats: RunStats,
    /// Run directory, when a layout was written.
    pub output_path: Option<PathBuf>,
    /// Why the configured run layout could not be written.
    pub layout_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each detail fetch completes.
    fn detail_fetched(&self, reference: &str, fetched: bool, done: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, run: &PipelineRun);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn detail_fetched(&self, _reference: &str, _fetched: bool, _done: usize, _total: usize) {}
    fn done(&self, _run: &PipelineRun) {}
}

struct FetchProgressAdapter<'a>(&'a dyn ProgressReporter);

impl FetchProgress for FetchProgressAdapter<'_> {
    fn completed(&self, result: &FetchResult, done: usize, total: usize) {
        self.0
            .detail_fetched(result.reference.as_str(), result.is_fetched(), done, total);
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Row of the analysis cache fingerprint: comparable fields plus the text
/// the analyzer will read.
#[derive(Serialize)]
struct AnalysisInputRow<'a> {
    url: &'a str,
    title: &'a str,
    company: &'a str,
    location: &'a str,
    text: Option<&'a str>,
}

/// Run the full pipeline.
///
/// Only configuration problems fail the run. Fetch failures, cache trouble,
/// summary failures and layout write errors are reported in the returned
/// [`PipelineRun`].
#[instrument(skip_all, fields(scope = %request.cache_scope, stubs = request.stubs.len()))]
pub async fn run_pipeline<F, S, G>(
    request: RunRequest,
    fetcher: Arc<F>,
    store: &S,
    generator: Option<&G>,
    cancel: &CancelFlag,
    progress: &dyn ProgressReporter,
) -> Result<PipelineRun>
where
    F: Fetcher + 'static,
    S: ReportStore,
    G: TextGenerator,
{
    let start = Instant::now();
    let RunRequest {
        stubs,
        config,
        catalog,
        cache_scope,
        sources,
        summary,
    } = request;

    // --- Phase 1: Validate ---
    progress.phase("Validating configuration");
    config.validate()?;
    let analyzer = Analyzer::new(catalog, &config.analysis)?;
    let report_key = scoped_key(&cache_scope, REPORT_ARTIFACT)?;
    let summary_key = match &summary {
        Some(_) => Some(scoped_key(&cache_scope, SUMMARY_ARTIFACT)?),
        None => None,
    };

    let run_id = RunId::new();
    info!(%run_id, catalog = %analyzer.catalog().version, "starting pipeline");

    // --- Phase 2: Source filter ---
    let stub_count = stubs.len();
    let mut postings: Vec<Posting> = if sources.is_empty() {
        stubs
    } else {
        stubs
            .into_iter()
            .filter(|p| sources.iter().any(|s| s.eq_ignore_ascii_case(&p.source)))
            .collect()
    };
    let filtered_out = stub_count - postings.len();
    if filtered_out > 0 {
        debug!(filtered_out, "postings dropped by source filter");
    }

    let dedupe_config = DedupeConfig::from(&config.dedupe);
    let mut dedupe_stats: Option<DedupeStats> = None;

    if config.dedupe_before_details {
        progress.phase("Deduplicating listings");
        let outcome = dedupe(postings, &dedupe_config);
        dedupe_stats = Some(outcome.stats);
        postings = outcome.survivors;
    }

    // --- Phase 3: Detail fetch ---
    progress.phase("Fetching posting details");
    let pending: Vec<usize> = postings
        .iter_mut()
        .enumerate()
        .filter(|(_, p)| !p.has_full_description())
        .map(|(i, p)| {
            // Listings from an earlier run may carry a failed or skipped state.
            p.reopen_detail();
            i
        })
        .collect();
    let refs = pending.iter().map(|&i| postings[i].url.clone()).collect();

    let batch = fetch_all(
        refs,
        fetcher,
        &config.fetch,
        cancel,
        &FetchProgressAdapter(progress),
    )
    .await;
    let partial = batch.was_interrupted();
    let fetch_stats = batch.stats;

    for result in batch.results {
        let posting = &mut postings[pending[result.index]];
        let merged = match result.status {
            FetchStatus::Fetched { detail, .. } => posting.mark_fetched(detail),
            FetchStatus::Failed { error, attempts } => {
                debug!(url = %posting.url, %error, attempts, "keeping listing summary only");
                posting.mark_failed()
            }
            FetchStatus::NotFetched { reason } => {
                debug!(url = %posting.url, reason = reason.as_str(), "detail not fetched");
                posting.mark_not_fetched()
            }
        };
        if !merged {
            warn!(url = %posting.url, state = ?posting.detail, "fetch result not merged");
        }
    }

    // --- Phase 4: Dedupe ---
    let dedupe_stats = match dedupe_stats {
        Some(stats) => stats,
        None => {
            progress.phase("Deduplicating postings");
            let outcome = dedupe(postings, &dedupe_config);
            postings = outcome.survivors;
            outcome.stats
        }
    };

    // --- Phase 5: Analysis (cached) ---
    progress.phase("Analyzing requirements");
    let rows: Vec<AnalysisInputRow<'_>> = postings
        .iter()
        .map(|p| AnalysisInputRow {
            url: p.url.as_str(),
            title: &p.title,
            company: &p.company,
            location: &p.location,
            text: analyzer.text_for(p),
        })
        .collect();
    let identity = json!({
        "catalog_version": analyzer.catalog().version,
        "catalog_digest": analyzer.catalog_digest(),
    });
    let fingerprint = compute_input_fingerprint(&rows, &identity, analyzer.settings())?;

    let stored = store.load(&report_key).await.unwrap_or_else(|e| {
        warn!(key = %report_key, error = %e, "report cache unavailable");
        None
    });
    let resolution = resolve(stored, &fingerprint);
    let report_status = resolution.status;

    let (report, report_reused) = match resolution.artifact {
        Some(Artifact::Report(report)) if report_status == CacheStatus::Current => {
            info!(key = %report_key, "reusing cached analysis report");
            (report, true)
        }
        _ => {
            let report = analyzer.analyze(&postings);
            let entry = CacheEntry::new(fingerprint, Artifact::Report(report.clone()));
            if let Err(e) = store.save(&report_key, &entry).await {
                warn!(key = %report_key, error = %e, "failed to cache analysis report");
            }
            (report, false)
        }
    };

    // --- Phase 6: Summary ---
    let summary = match (&summary, generator, &summary_key) {
        (Some(config), Some(generator), Some(key)) => {
            progress.phase("Generating summary");
            Some(summarize(&report, config, generator, store, key).await)
        }
        _ => None,
    };

    let stats = RunStats {
        stubs: stub_count,
        filtered_out,
        requested: fetch_stats.requested,
        fetched: fetch_stats.fetched,
        failed: fetch_stats.failed,
        not_fetched: fetch_stats.not_fetched,
        retries: fetch_stats.retries,
        url_duplicates: dedupe_stats.url_duplicates,
        content_duplicates: dedupe_stats.content_duplicates,
        surviving: dedupe_stats.surviving,
        postings_without_text: report.meta.postings_without_text,
        partial,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    // --- Phase 7: Run layout ---
    let mut layout_error = None;
    let output_path = match &config.output_dir {
        Some(dir) => {
            progress.phase("Writing run layout");
            let layout = RunLayout {
                run_id: &run_id,
                scope: &cache_scope,
                postings: &postings,
                report: &report,
                stats: &stats,
                summary: summary.as_ref().and_then(|s| s.text.as_deref()),
            };
            match write_run_layout(dir, &layout) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to write run layout");
                    layout_error = Some(e.to_string());
                    None
                }
            }
        }
        None => None,
    };

    info!(
        %run_id,
        fetched = stats.fetched,
        failed = stats.failed,
        not_fetched = stats.not_fetched,
        surviving = stats.surviving,
        report = %report_status,
        partial,
        elapsed_ms = stats.elapsed_ms,
        "pipeline completed"
    );

    let run = PipelineRun {
        run_id,
        scope: cache_scope,
        postings,
        report,
        report_status,
        report_reused,
        summary,
        stats,
        output_path,
        layout_error,
    };
    progress.done(&run);
    Ok(run)
}

fn scoped_key(scope: &str, artifact: &str) -> Result<StoreKey> {
    StoreKey::new(scope, artifact)
        .map_err(|e| JobSignalError::config(format!("invalid cache scope: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use jobsignal_fetch::FetchError;
    use jobsignal_shared::{PostingRef, RetryPolicy};
    use jobsignal_storage::FsReportStore;
    use uuid::Uuid;

    use crate::summary::NoSummary;

    const CATALOG: &str = r#"
version = "test-1"

[[categories]]
key = "certifications"
label = "Certifications"

[[categories.terms]]
name = "CCNA"
matcher = { phrase = "CCNA" }

[[categories.terms]]
name = "ITIL"
matcher = { phrase = "ITIL" }
"#;

    /// Succeeds with a requirements block; references in `hang` never answer.
    /// Each call takes `delay`, and call number `cancel_on_call` raises `cancel`.
    #[derive(Default)]
    struct StubFetcher {
        hang: HashSet<String>,
        delay: Duration,
        cancel: Option<(CancelFlag, usize)>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn hanging(refs: &[&str]) -> Self {
            Self {
                hang: refs.iter().map(|r| r.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    impl Fetcher for StubFetcher {
        async fn fetch(
            &self,
            reference: &PostingRef,
            _timeout: Duration,
        ) -> std::result::Result<String, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((flag, on_call)) = &self.cancel {
                if call == *on_call {
                    flag.cancel();
                }
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.hang.contains(reference.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(format!(
                "About the role\nSupport for {reference}.\n\nRequirements:\n- CCNA certification\n- ITIL Foundation (desirable)\n"
            ))
        }
    }

    fn url(i: usize) -> String {
        format!("https://jobs.example/{i}")
    }

    fn stubs(n: usize) -> Vec<Posting> {
        (0..n)
            .map(|i| {
                let tag = char::from(b'a' + i as u8);
                let mut p = Posting::stub(
                    url(i),
                    format!("Service Desk Analyst {tag}{tag}"),
                    format!("Company {tag}{tag}{tag}"),
                    "Sydney NSW",
                );
                p.source = "seek".into();
                p
            })
            .collect()
    }

    fn config(workers: usize) -> RunConfig {
        let mut config = RunConfig::default();
        config.fetch.worker_count = workers;
        config.fetch.per_call_timeout = Duration::from_secs(5);
        config.fetch.retry = RetryPolicy::fixed(1, Duration::from_secs(1));
        config
    }

    fn request(stubs: Vec<Posting>, config: RunConfig, version: &str) -> RunRequest {
        let mut catalog = Catalog::from_toml_str(CATALOG).unwrap();
        catalog.version = version.into();
        RunRequest {
            stubs,
            config,
            catalog,
            cache_scope: "sydney-it".into(),
            sources: vec![],
            summary: None,
        }
    }

    fn temp_store() -> (FsReportStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("js_pipeline_{}", Uuid::now_v7()));
        (FsReportStore::new(&root), root)
    }

    async fn run(
        request: RunRequest,
        fetcher: &Arc<StubFetcher>,
        store: &FsReportStore,
    ) -> Result<PipelineRun> {
        run_pipeline(
            request,
            Arc::clone(fetcher),
            store,
            None::<&NoSummary>,
            &CancelFlag::new(),
            &SilentProgress,
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn two_hanging_fetches_fail_without_failing_the_run() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::hanging(&[&url(3), &url(7)]));

        let run = run(request(stubs(10), config(3), "v1"), &fetcher, &store)
            .await
            .expect("run completes");

        assert_eq!(run.stats.fetched, 8);
        assert_eq!(run.stats.failed, 2);
        assert_eq!(run.stats.surviving, 10);
        assert!(!run.stats.partial);
        assert_eq!(run.postings[3].detail, jobsignal_shared::DetailStatus::Failed);
        assert!(run.postings[3].full_description.is_none());
        assert_eq!(run.report.meta.total_postings, 10);
        assert_eq!(run.report.meta.postings_without_text, 2);

        let ccna = run.report.category("certifications").unwrap().term("CCNA").unwrap();
        assert_eq!(ccna.presence, 8);
        assert!(!ccna.postings.contains(&3));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_reuses_cached_report() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());

        let first = run(request(stubs(4), config(2), "v1"), &fetcher, &store)
            .await
            .unwrap();
        assert_eq!(first.report_status, CacheStatus::Absent);
        assert!(!first.report_reused);

        let second = run(request(stubs(4), config(2), "v1"), &fetcher, &store)
            .await
            .unwrap();
        assert_eq!(second.report_status, CacheStatus::Current);
        assert!(second.report_reused);
        assert_eq!(second.report, first.report);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn catalog_change_outdates_report() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());

        run(request(stubs(4), config(2), "v1"), &fetcher, &store)
            .await
            .unwrap();
        let again = run(request(stubs(4), config(2), "v2"), &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(again.report_status, CacheStatus::Outdated);
        assert!(!again.report_reused);
        assert_eq!(again.report.meta.catalog_version, "v2");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_fetching() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());

        let err = run(request(stubs(3), config(0), "v1"), &fetcher, &store)
            .await
            .unwrap_err();

        assert!(err.is_config());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn invalid_scope_is_config_error() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());
        let mut req = request(stubs(1), config(1), "v1");
        req.cache_scope = "../escape".into();

        let err = run(req, &fetcher, &store).await.unwrap_err();
        assert!(err.is_config());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn dedupe_before_details_skips_duplicate_fetches() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());
        let mut postings = stubs(2);
        postings.push(postings[0].clone());

        let mut cfg = config(2);
        cfg.dedupe_before_details = true;
        let run = run(request(postings, cfg, "v1"), &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(run.stats.url_duplicates, 1);
        assert_eq!(run.stats.surviving, 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn postings_with_full_text_are_not_fetched() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());
        let mut postings = stubs(3);
        postings[1] = postings[1].clone().with_full_description("- ITIL required");

        let run = run(request(postings, config(2), "v1"), &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(run.stats.requested, 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn source_filter_drops_other_sites() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());
        let mut postings = stubs(3);
        postings[2].source = "indeed".into();

        let mut req = request(postings, config(2), "v1");
        req.sources = vec!["SEEK".into()];
        let run = run(req, &fetcher, &store).await.unwrap();

        assert_eq!(run.stats.filtered_out, 1);
        assert_eq!(run.postings.len(), 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn summary_failure_is_not_fatal() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());
        let mut req = request(stubs(2), config(2), "v1");
        req.summary = Some(SummaryConfig::default());

        let run = run_pipeline(
            req,
            Arc::clone(&fetcher),
            &store,
            Some(&NoSummary),
            &CancelFlag::new(),
            &SilentProgress,
        )
        .await
        .expect("run completes");

        let summary = run.summary.expect("summary attempted");
        assert_eq!(summary.status, CacheStatus::Absent);
        assert!(summary.text.is_none());
        assert!(summary.error.is_some());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_layout_when_output_dir_set() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());
        let mut cfg = config(2);
        cfg.output_dir = Some(root.clone());

        let run = run(request(stubs(2), cfg, "v1"), &fetcher, &store)
            .await
            .unwrap();

        let path = run.output_path.expect("layout written");
        assert!(path.join("analysis_report.json").exists());
        let stats: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path.join("run.json")).unwrap())
                .unwrap();
        assert_eq!(stats["fetched"], 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_listing_is_refetched() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher::default());
        let mut postings = stubs(2);
        postings[0].mark_failed();
        postings[1].mark_not_fetched();

        let run = run(request(postings, config(2), "v1"), &fetcher, &store)
            .await
            .unwrap();

        assert_eq!(run.stats.fetched, 2);
        assert_eq!(run.stats.postings_without_text, 0);
        for posting in &run.postings {
            assert_eq!(posting.detail, jobsignal_shared::DetailStatus::Fetched);
            assert!(posting.has_full_description());
        }
        let ccna = run.report.category("certifications").unwrap().term("CCNA").unwrap();
        assert_eq!(ccna.presence, 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn layout_failure_keeps_the_run() {
        let (store, root) = temp_store();
        std::fs::create_dir_all(&root).unwrap();
        let blocker = root.join("not-a-dir");
        std::fs::write(&blocker, b"occupied").unwrap();

        let fetcher = Arc::new(StubFetcher::default());
        let mut cfg = config(2);
        cfg.output_dir = Some(blocker);

        let run = run(request(stubs(2), cfg, "v1"), &fetcher, &store)
            .await
            .expect("run completes");

        assert!(run.output_path.is_none());
        assert!(run.layout_error.is_some());
        assert_eq!(run.stats.fetched, 2);
        assert_eq!(run.report.meta.total_postings, 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_marks_run_partial() {
        let (store, root) = temp_store();
        let fetcher = Arc::new(StubFetcher {
            delay: Duration::from_secs(1),
            ..Default::default()
        });
        let mut cfg = config(1);
        cfg.fetch.run_deadline = Some(Duration::from_millis(2500));

        let run = run(request(stubs(6), cfg, "v1"), &fetcher, &store)
            .await
            .expect("run completes");

        assert!(run.stats.partial);
        assert_eq!(run.stats.fetched, 3);
        assert_eq!(run.stats.not_fetched, 3);
        assert_eq!(run.postings.len(), 6);
        for posting in &run.postings[..3] {
            assert!(posting.has_full_description());
        }
        for posting in &run.postings[3..] {
            assert_eq!(posting.detail, jobsignal_shared::DetailStatus::NotFetched);
        }
        let ccna = run.report.category("certifications").unwrap().term("CCNA").unwrap();
        assert_eq!(ccna.postings, vec![0, 1, 2]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn cancellation_keeps_fetched_postings() {
        let (store, root) = temp_store();
        let cancel = CancelFlag::new();
        let fetcher = Arc::new(StubFetcher {
            cancel: Some((cancel.clone(), 2)),
            ..Default::default()
        });

        let run = run_pipeline(
            request(stubs(5), config(1), "v1"),
            fetcher,
            &store,
            None::<&NoSummary>,
            &cancel,
            &SilentProgress,
        )
        .await
        .expect("run completes");

        assert!(run.stats.partial);
        assert_eq!(run.stats.fetched, 2);
        assert_eq!(run.stats.not_fetched, 3);
        assert!(run.postings[0].has_full_description());
        assert!(run.postings[1].has_full_description());
        assert_eq!(run.postings[4].detail, jobsignal_shared::DetailStatus::NotFetched);
        assert_eq!(run.report.meta.postings_without_text, 3);
        let _ = std::fs::remove_dir_all(&root);
    }
}
