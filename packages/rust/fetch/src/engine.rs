//! Bounded-concurrency detail fetch orchestrator.
//!
//! A fixed set of worker tasks drains a bounded queue of posting references.
//! Each worker owns one reference at a time, retries it per the configured
//! policy, and reports an index-tagged result. Results are re-joined in
//! submission order, so output never depends on completion order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use jobsignal_shared::{FetchSettings, PostingRef, RetryPolicy};

use crate::fetcher::{CancelFlag, FetchError, Fetcher};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why a reference was never submitted to the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Beyond `max_details`.
    OverCap,
    /// The run was cancelled before a worker picked it up.
    Cancelled,
    /// The run deadline passed before a worker picked it up.
    Deadline,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OverCap => "over_cap",
            Self::Cancelled => "cancelled",
            Self::Deadline => "deadline",
        }
    }
}

/// Outcome for one reference.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    Fetched { detail: String, attempts: u32 },
    Failed { error: FetchError, attempts: u32 },
    NotFetched { reason: SkipReason },
}

/// One entry of the ordered output, tagged with its submission index.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub index: usize,
    pub reference: PostingRef,
    pub status: FetchStatus,
}

impl FetchResult {
    pub fn is_fetched(&self) -> bool {
        matches!(self.status, FetchStatus::Fetched { .. })
    }
}

/// Counters for a completed batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStats {
    pub requested: usize,
    pub submitted: usize,
    pub fetched: usize,
    pub failed: usize,
    pub not_fetched: usize,
    /// Attempts beyond the first, summed over all references.
    pub retries: u64,
    pub elapsed: Duration,
}

/// Ordered results plus stats. `results.len()` always equals the input length.
#[derive(Debug, Clone)]
pub struct FetchBatch {
    pub results: Vec<FetchResult>,
    pub stats: FetchStats,
}

impl FetchBatch {
    /// True when cancellation or the deadline left references unsubmitted.
    pub fn was_interrupted(&self) -> bool {
        self.results.iter().any(|r| {
            matches!(
                r.status,
                FetchStatus::NotFetched {
                    reason: SkipReason::Cancelled | SkipReason::Deadline
                }
            )
        })
    }
}

/// Progress callback for fetch batches.
pub trait FetchProgress: Send + Sync {
    /// Called as each submitted reference completes, in completion order.
    fn completed(&self, result: &FetchResult, done: usize, total: usize);
}

/// No-op fetch progress.
pub struct SilentFetchProgress;

impl FetchProgress for SilentFetchProgress {
    fn completed(&self, _result: &FetchResult, _done: usize, _total: usize) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Fetch detail for every reference, honoring the worker limit, per-call
/// timeout, retry policy, detail cap, deadline and cancellation.
///
/// Never fails as a whole: every reference ends up fetched, failed, or
/// not fetched.
#[instrument(skip_all, fields(refs = refs.len(), workers = settings.worker_count))]
pub async fn fetch_all<F>(
    refs: Vec<PostingRef>,
    fetcher: Arc<F>,
    settings: &FetchSettings,
    cancel: &CancelFlag,
    progress: &dyn FetchProgress,
) -> FetchBatch
where
    F: Fetcher + 'static,
{
    let start = Instant::now();
    let total = refs.len();
    let cap = settings.max_details.unwrap_or(total).min(total);
    let deadline = settings.run_deadline.map(|d| start + d);

    let mut slots: Vec<Option<FetchResult>> = vec![None; total];
    for (index, reference) in refs.iter().enumerate().skip(cap) {
        slots[index] = Some(FetchResult {
            index,
            reference: reference.clone(),
            status: FetchStatus::NotFetched {
                reason: SkipReason::OverCap,
            },
        });
    }

    let queue: Arc<Mutex<VecDeque<(usize, PostingRef)>>> = Arc::new(Mutex::new(
        refs.iter().take(cap).cloned().enumerate().collect(),
    ));

    info!(
        total,
        cap,
        timeout_ms = settings.per_call_timeout.as_millis() as u64,
        max_retries = settings.retry.max_retries,
        "starting detail fetch"
    );

    let worker_count = settings.worker_count.min(cap);
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<FetchResult>();
    let mut handles = Vec::with_capacity(worker_count);

    for worker in 0..worker_count {
        let queue = queue.clone();
        let fetcher = fetcher.clone();
        let tx = result_tx.clone();
        let cancel = cancel.clone();
        let retry = settings.retry.clone();
        let timeout = settings.per_call_timeout;

        handles.push(tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
                    debug!(worker, "worker stopping before next reference");
                    break;
                }
                let next = queue.lock().await.pop_front();
                let Some((index, reference)) = next else {
                    break;
                };

                let status =
                    fetch_with_retry(fetcher.as_ref(), &reference, timeout, &retry, &cancel).await;
                if tx
                    .send(FetchResult {
                        index,
                        reference,
                        status,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut done = 0usize;
    while let Some(result) = result_rx.recv().await {
        done += 1;
        progress.completed(&result, done, cap);
        let index = result.index;
        slots[index] = Some(result);
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "fetch worker aborted");
        }
    }

    // Anything still queued was never submitted.
    let leftover_reason = if cancel.is_cancelled() {
        SkipReason::Cancelled
    } else {
        SkipReason::Deadline
    };
    for (index, reference) in queue.lock().await.drain(..) {
        slots[index] = Some(FetchResult {
            index,
            reference,
            status: FetchStatus::NotFetched {
                reason: leftover_reason,
            },
        });
    }

    let results: Vec<FetchResult> = slots
        .into_iter()
        .zip(refs)
        .enumerate()
        .map(|(index, (slot, reference))| {
            slot.unwrap_or(FetchResult {
                index,
                reference,
                status: FetchStatus::Failed {
                    error: FetchError::Transport("worker aborted".into()),
                    attempts: 0,
                },
            })
        })
        .collect();

    let stats = tally(&results, start.elapsed());
    info!(
        fetched = stats.fetched,
        failed = stats.failed,
        not_fetched = stats.not_fetched,
        retries = stats.retries,
        duration_ms = stats.elapsed.as_millis() as u64,
        "detail fetch completed"
    );

    FetchBatch { results, stats }
}

/// Attempt one reference until success, a terminal error, or an exhausted budget.
async fn fetch_with_retry<F: Fetcher>(
    fetcher: &F,
    reference: &PostingRef,
    timeout: Duration,
    retry: &RetryPolicy,
    cancel: &CancelFlag,
) -> FetchStatus {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(timeout, fetcher.fetch(reference, timeout)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        let error = match outcome {
            Ok(detail) => {
                debug!(%reference, attempt, "fetched detail");
                return FetchStatus::Fetched {
                    detail,
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= retry.max_attempts() || cancel.is_cancelled() {
            warn!(%reference, attempt, kind = error.kind(), error = %error, "detail fetch failed");
            return FetchStatus::Failed {
                error,
                attempts: attempt,
            };
        }

        let delay = retry.delay_for_retry(attempt);
        debug!(
            %reference,
            attempt,
            kind = error.kind(),
            delay_ms = delay.as_millis() as u64,
            "retrying detail fetch"
        );
        tokio::time::sleep(delay).await;

        if cancel.is_cancelled() {
            return FetchStatus::Failed {
                error,
                attempts: attempt,
            };
        }
    }
}

fn tally(results: &[FetchResult], elapsed: Duration) -> FetchStats {
    let mut stats = FetchStats {
        requested: results.len(),
        elapsed,
        ..Default::default()
    };
    for result in results {
        match &result.status {
            FetchStatus::Fetched { attempts, .. } => {
                stats.submitted += 1;
                stats.fetched += 1;
                stats.retries += u64::from(attempts.saturating_sub(1));
            }
            FetchStatus::Failed { attempts, .. } => {
                stats.submitted += 1;
                stats.failed += 1;
                stats.retries += u64::from(attempts.saturating_sub(1));
            }
            FetchStatus::NotFetched { .. } => stats.not_fetched += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    // -- test fetchers -------------------------------------------------------

    /// Replays a scripted outcome per attempt; the last entry repeats.
    #[derive(Default)]
    struct ScriptedFetcher {
        scripts: HashMap<String, Vec<Result<String, FetchError>>>,
        calls: Mutex<HashMap<String, usize>>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn script(mut self, reference: &str, outcomes: Vec<Result<String, FetchError>>) -> Self {
            self.scripts.insert(reference.to_string(), outcomes);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        async fn calls_for(&self, reference: &str) -> usize {
            self.calls.lock().await.get(reference).copied().unwrap_or(0)
        }
    }

    impl Fetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            reference: &PostingRef,
            _timeout: Duration,
        ) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let attempt = {
                let mut calls = self.calls.lock().await;
                let n = calls.entry(reference.to_string()).or_insert(0);
                *n += 1;
                *n
            };
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.scripts.get(reference.as_str()) {
                Some(script) => {
                    let i = (attempt - 1).min(script.len() - 1);
                    script[i].clone()
                }
                None => Ok(format!("detail for {reference}")),
            }
        }
    }

    /// Sleeps for a per-reference delay, then succeeds.
    struct DelayFetcher {
        delays: HashMap<String, Duration>,
    }

    impl Fetcher for DelayFetcher {
        async fn fetch(
            &self,
            reference: &PostingRef,
            _timeout: Duration,
        ) -> Result<String, FetchError> {
            let delay = self
                .delays
                .get(reference.as_str())
                .copied()
                .unwrap_or_default();
            tokio::time::sleep(delay).await;
            Ok(format!("detail for {reference}"))
        }
    }

    /// Raises the cancel flag on its Nth call.
    struct CancellingFetcher {
        cancel: CancelFlag,
        cancel_on_call: usize,
        calls: AtomicUsize,
    }

    impl Fetcher for CancellingFetcher {
        async fn fetch(
            &self,
            reference: &PostingRef,
            _timeout: Duration,
        ) -> Result<String, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.cancel_on_call {
                self.cancel.cancel();
            }
            Ok(format!("detail for {reference}"))
        }
    }

    fn refs(n: usize) -> Vec<PostingRef> {
        (0..n)
            .map(|i| PostingRef::new(format!("https://jobs.example/{i}")))
            .collect()
    }

    fn settings(workers: usize, max_retries: u32) -> FetchSettings {
        FetchSettings {
            worker_count: workers,
            per_call_timeout: Duration::from_millis(500),
            retry: RetryPolicy::fixed(max_retries, Duration::from_millis(10)),
            max_details: None,
            run_deadline: None,
        }
    }

    fn timeout_err() -> FetchError {
        FetchError::Timeout(Duration::from_millis(500))
    }

    // -- tests ---------------------------------------------------------------

    #[tokio::test]
    async fn empty_input_yields_empty_batch() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let batch = fetch_all(
            vec![],
            fetcher,
            &settings(4, 2),
            &CancelFlag::new(),
            &SilentFetchProgress,
        )
        .await;
        assert!(batch.results.is_empty());
        assert_eq!(batch.stats.requested, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failures_keep_order_and_length() {
        let input = refs(20);
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .script(input[3].as_str(), vec![Err(timeout_err())])
                .script(input[17].as_str(), vec![Err(timeout_err())])
                .with_delay(Duration::from_millis(20)),
        );

        let batch = fetch_all(
            input.clone(),
            fetcher.clone(),
            &settings(5, 2),
            &CancelFlag::new(),
            &SilentFetchProgress,
        )
        .await;

        assert_eq!(batch.results.len(), 20);
        for (i, result) in batch.results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert_eq!(result.reference, input[i]);
        }
        assert_eq!(batch.stats.fetched, 18);
        assert_eq!(batch.stats.failed, 2);
        for i in [3, 17] {
            match &batch.results[i].status {
                FetchStatus::Failed { error, attempts } => {
                    assert_eq!(error.kind(), "timeout");
                    assert_eq!(*attempts, 3);
                }
                other => panic!("expected failure at {i}, got {other:?}"),
            }
            assert_eq!(fetcher.calls_for(input[i].as_str()).await, 3);
        }
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 5);
        assert!(!batch.was_interrupted());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success() {
        let input = refs(1);
        let fetcher = Arc::new(ScriptedFetcher::default().script(
            input[0].as_str(),
            vec![
                Err(FetchError::Blocked("429".into())),
                Err(FetchError::Transport("reset".into())),
                Ok("finally".into()),
            ],
        ));

        let batch = fetch_all(
            input,
            fetcher,
            &settings(2, 2),
            &CancelFlag::new(),
            &SilentFetchProgress,
        )
        .await;

        assert_eq!(
            batch.results[0].status,
            FetchStatus::Fetched {
                detail: "finally".into(),
                attempts: 3
            }
        );
        assert_eq!(batch.stats.retries, 2);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let input = refs(1);
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .script(input[0].as_str(), vec![Err(FetchError::NotFound("gone".into()))]),
        );

        let batch = fetch_all(
            input.clone(),
            fetcher.clone(),
            &settings(1, 5),
            &CancelFlag::new(),
            &SilentFetchProgress,
        )
        .await;

        assert!(matches!(
            batch.results[0].status,
            FetchStatus::Failed { attempts: 1, .. }
        ));
        assert_eq!(fetcher.calls_for(input[0].as_str()).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_hits_per_call_timeout() {
        let input = refs(1);
        let fetcher = Arc::new(ScriptedFetcher::default().with_delay(Duration::from_secs(60)));

        let batch = fetch_all(
            input,
            fetcher,
            &settings(1, 0),
            &CancelFlag::new(),
            &SilentFetchProgress,
        )
        .await;

        match &batch.results[0].status {
            FetchStatus::Failed { error, attempts } => {
                assert_eq!(*error, FetchError::Timeout(Duration::from_millis(500)));
                assert_eq!(*attempts, 1);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn detail_cap_leaves_tail_untouched() {
        let input = refs(5);
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut cfg = settings(3, 0);
        cfg.max_details = Some(2);

        let batch = fetch_all(
            input.clone(),
            fetcher.clone(),
            &cfg,
            &CancelFlag::new(),
            &SilentFetchProgress,
        )
        .await;

        assert_eq!(batch.results.len(), 5);
        assert!(batch.results[0].is_fetched());
        assert!(batch.results[1].is_fetched());
        for result in &batch.results[2..] {
            assert_eq!(
                result.status,
                FetchStatus::NotFetched {
                    reason: SkipReason::OverCap
                }
            );
        }
        assert_eq!(fetcher.calls_for(input[4].as_str()).await, 0);
        assert_eq!(batch.stats.submitted, 2);
    }

    #[tokio::test]
    async fn zero_cap_submits_nothing() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut cfg = settings(3, 0);
        cfg.max_details = Some(0);

        let batch = fetch_all(
            refs(3),
            fetcher,
            &cfg,
            &CancelFlag::new(),
            &SilentFetchProgress,
        )
        .await;
        assert_eq!(batch.stats.not_fetched, 3);
        assert_eq!(batch.stats.submitted, 0);
    }

    #[tokio::test]
    async fn cancellation_keeps_completed_results() {
        let cancel = CancelFlag::new();
        let fetcher = Arc::new(CancellingFetcher {
            cancel: cancel.clone(),
            cancel_on_call: 2,
            calls: AtomicUsize::new(0),
        });

        let batch = fetch_all(refs(5), fetcher, &settings(1, 0), &cancel, &SilentFetchProgress).await;

        assert_eq!(batch.results.len(), 5);
        assert!(batch.results[0].is_fetched());
        // In-flight call completes even though it raised the flag.
        assert!(batch.results[1].is_fetched());
        for result in &batch.results[2..] {
            assert_eq!(
                result.status,
                FetchStatus::NotFetched {
                    reason: SkipReason::Cancelled
                }
            );
        }
        assert!(batch.was_interrupted());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_new_submissions() {
        let input = refs(6);
        let fetcher = Arc::new(ScriptedFetcher::default().with_delay(Duration::from_secs(1)));
        let mut cfg = settings(1, 0);
        cfg.per_call_timeout = Duration::from_secs(5);
        cfg.run_deadline = Some(Duration::from_millis(2500));

        let batch = fetch_all(input, fetcher, &cfg, &CancelFlag::new(), &SilentFetchProgress).await;

        let fetched = batch.results.iter().filter(|r| r.is_fetched()).count();
        assert_eq!(fetched, 3);
        for result in &batch.results[3..] {
            assert_eq!(
                result.status,
                FetchStatus::NotFetched {
                    reason: SkipReason::Deadline
                }
            );
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 32, ..ProptestConfig::default() })]

        #[test]
        fn output_order_matches_input_order(
            delays in proptest::collection::vec(0u64..200, 0..40),
            workers in 1usize..8,
        ) {
            let input = refs(delays.len());
            let fetcher = Arc::new(DelayFetcher {
                delays: input
                    .iter()
                    .zip(&delays)
                    .map(|(r, ms)| (r.to_string(), Duration::from_millis(*ms)))
                    .collect(),
            });
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let batch = rt.block_on(fetch_all(
                input.clone(),
                fetcher,
                &settings(workers, 0),
                &CancelFlag::new(),
                &SilentFetchProgress,
            ));

            prop_assert_eq!(batch.results.len(), input.len());
            for (i, result) in batch.results.iter().enumerate() {
                prop_assert_eq!(result.index, i);
                prop_assert_eq!(&result.reference, &input[i]);
                prop_assert_eq!(
                    &result.status,
                    &FetchStatus::Fetched { detail: format!("detail for {}", input[i]), attempts: 1 }
                );
            }
        }
    }
}
