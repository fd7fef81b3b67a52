use crate::config::{RetentionConfig, Settings};
use crate::errors::{storage, AuditError};
use crate::metrics_api::MetricExtractor;
use crate::model::{
    AuditRun, MatchedPair, MetricsRecord, Probe, ProbeFailure, ProbeOutcome, Response, RunStatus,
};
use crate::providers::Responder;
use crate::ratelimit::RateLimiter;
use crate::redaction::PiiGuard;
use crate::storage::store::Store;
use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Retry, timeout and pairing knobs for one run.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Responders to build; the runner starts one worker per responder.
    pub workers: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Longest a pair may take from its first probe to its last.
    pub max_pair_skew: Duration,
    /// Times a pair may go back to the queue before it is failed as a whole.
    pub max_deferrals: u32,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            max_pair_skew: Duration::from_secs(30),
            max_deferrals: 3,
        }
    }
}

impl From<&Settings> for DispatchPolicy {
    fn from(s: &Settings) -> Self {
        let d = Self::default();
        Self {
            workers: s.workers.unwrap_or(d.workers).max(1),
            timeout: s.timeout_seconds.map(Duration::from_secs).unwrap_or(d.timeout),
            max_retries: s.max_retries.unwrap_or(d.max_retries),
            backoff_base: s
                .backoff_base_ms
                .map(Duration::from_millis)
                .unwrap_or(d.backoff_base),
            backoff_max: s
                .backoff_max_ms
                .map(Duration::from_millis)
                .unwrap_or(d.backoff_max),
            max_pair_skew: s
                .max_pair_skew_ms
                .map(Duration::from_millis)
                .unwrap_or(d.max_pair_skew),
            max_deferrals: s.max_deferrals.unwrap_or(d.max_deferrals),
        }
    }
}

impl DispatchPolicy {
    /// Wait before retry number `retry` (1-based): base doubled per retry, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

/// What of a raw reply reaches the store.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub store_raw_text: bool,
    pub redact_before_persist: bool,
    pub guard: PiiGuard,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&RetentionConfig::default())
    }
}

impl RetentionPolicy {
    pub fn from_config(cfg: &RetentionConfig) -> Self {
        Self {
            store_raw_text: cfg.store_raw_text,
            redact_before_persist: cfg.redact_before_persist,
            guard: PiiGuard::default(),
        }
    }

    /// Returns the text to persist and whether it went through redaction.
    pub fn apply(&self, text: String) -> (Option<String>, bool) {
        if !self.store_raw_text {
            return (None, false);
        }
        if self.redact_before_persist {
            return (Some(self.guard.redact_all(&text)), true);
        }
        (Some(text), false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTally {
    pub pairs_completed: usize,
    pub responses: usize,
    pub empty_responses: usize,
    pub failures: usize,
    pub deferrals: usize,
    pub metrics_recorded: usize,
}

impl RunTally {
    fn merge(&mut self, other: &RunTally) {
        self.pairs_completed += other.pairs_completed;
        self.responses += other.responses;
        self.empty_responses += other.empty_responses;
        self.failures += other.failures;
        self.deferrals += other.deferrals;
        self.metrics_recorded += other.metrics_recorded;
    }

    pub fn outcomes(&self) -> usize {
        self.responses + self.failures
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub pairs: usize,
    pub probes: usize,
    #[serde(flatten)]
    pub tally: RunTally,
    pub duration_ms: u64,
}

/// Drives matched pairs through responders into the store.
///
/// Each worker owns one responder and takes whole pairs from a shared queue;
/// all workers share one rate limiter. Outcomes of a pair are persisted
/// together or not at all.
pub struct AuditRunner {
    pub store: Store,
    pub limiter: Arc<RateLimiter>,
    pub policy: DispatchPolicy,
    pub retention: RetentionPolicy,
    /// When set, metrics are computed from the raw reply before retention
    /// applies, so they survive a policy that drops or redacts the text.
    pub extractor: Option<Arc<MetricExtractor>>,
}

impl AuditRunner {
    pub fn new(store: Store, limiter: Arc<RateLimiter>, policy: DispatchPolicy) -> Self {
        Self {
            store,
            limiter,
            policy,
            retention: RetentionPolicy::default(),
            extractor: None,
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<MetricExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Runs `pairs` for a freshly created `run`, one worker per responder.
    ///
    /// Returns the summary of a Completed or Cancelled run. A fatal error
    /// (storage, configuration) marks the run Failed and is returned; what was
    /// persisted before it stays.
    pub async fn run(
        &self,
        run: &mut AuditRun,
        pairs: Vec<MatchedPair>,
        responders: Vec<Arc<dyn Responder>>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, AuditError> {
        if run.status != RunStatus::Created {
            return Err(AuditError::Configuration(format!(
                "run {} was already started ({})",
                run.id,
                run.status.as_str()
            )));
        }
        if responders.is_empty() {
            return Err(AuditError::Configuration("no responders for run".into()));
        }

        run.pair_ids = pairs.iter().map(|p| p.id.clone()).collect();
        let recording = responders[0].fingerprint().map(str::to_string);
        if let (Some(fp), Some(snapshot)) = (&recording, run.config_snapshot.as_object_mut()) {
            snapshot.insert("recording_sha256".into(), fp.clone().into());
        }
        self.store.insert_run(run).map_err(storage)?;
        if let Err(e) = self.store.insert_pairs(&run.id, &pairs) {
            return Err(self.fail(run, storage(e)));
        }
        if let Err(e) = run
            .transition(RunStatus::Running)
            .and_then(|_| self.store.update_run(run).map_err(storage))
        {
            return Err(self.fail(run, e));
        }

        let total_pairs = pairs.len();
        let total_probes: usize = pairs.iter().map(|p| p.probes.len()).sum();
        tracing::info!(
            event = "fairprobe.run.started",
            run_id = %run.id,
            pairs = total_pairs,
            probes = total_probes,
            workers = responders.len(),
            recording = recording.as_deref().unwrap_or("-"),
        );
        if !self.retention.store_raw_text {
            tracing::warn!(
                event = "fairprobe.retention.raw_text_dropped",
                run_id = %run.id,
                "raw replies will not be persisted; metrics cannot be recomputed later"
            );
        }

        let started = Instant::now();
        let queue: VecDeque<PendingPair> = pairs
            .into_iter()
            .map(|pair| PendingPair { pair, deferrals: 0 })
            .collect();
        let queue = Arc::new(Mutex::new(queue));
        let halt = cancel.child_token();

        let mut handles = Vec::new();
        for (id, responder) in responders.into_iter().enumerate() {
            let worker = Worker {
                id,
                run_id: run.id.clone(),
                responder,
                store: self.store.clone(),
                limiter: self.limiter.clone(),
                policy: self.policy.clone(),
                retention: Arc::new(self.retention.clone()),
                extractor: self.extractor.clone(),
                queue: queue.clone(),
                cancel: halt.clone(),
            };
            handles.push(tokio::spawn(async move { worker.run().await }));
        }

        let mut tally = RunTally::default();
        let mut fatal: Option<AuditError> = None;
        for h in handles {
            match h.await {
                Ok((t, err)) => {
                    tally.merge(&t);
                    if let Some(e) = err {
                        fatal.get_or_insert(e);
                    }
                }
                Err(e) => {
                    halt.cancel();
                    fatal.get_or_insert(storage(anyhow::anyhow!("worker task failed: {}", e)));
                }
            }
        }

        if let Some(e) = fatal {
            return Err(self.fail(run, e));
        }

        let next = if tally.outcomes() >= total_probes {
            RunStatus::Completed
        } else if cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            let missing = total_probes - tally.outcomes();
            return Err(self.fail(
                run,
                storage(anyhow::anyhow!("{} probes left without an outcome", missing)),
            ));
        };
        run.transition(next)?;
        self.store.update_run(run).map_err(storage)?;

        let summary = RunSummary {
            run_id: run.id.clone(),
            status: run.status,
            pairs: total_pairs,
            probes: total_probes,
            tally,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            event = "fairprobe.run.finished",
            run_id = %summary.run_id,
            status = summary.status.as_str(),
            responses = summary.tally.responses,
            failures = summary.tally.failures,
            deferrals = summary.tally.deferrals,
            duration_ms = summary.duration_ms,
        );
        Ok(summary)
    }

    fn fail(&self, run: &mut AuditRun, err: AuditError) -> AuditError {
        run.error = Some(err.to_string());
        if run.transition(RunStatus::Failed).is_ok() {
            if let Err(e) = self.store.update_run(run) {
                tracing::error!(
                    event = "fairprobe.run.status_write_failed",
                    run_id = %run.id,
                    error = %e,
                );
            }
        }
        tracing::error!(event = "fairprobe.run.failed", run_id = %run.id, error = %err);
        err
    }
}

struct PendingPair {
    pair: MatchedPair,
    deferrals: u32,
}

struct Collected {
    outcome: ProbeOutcome,
    metrics: Option<MetricsRecord>,
}

enum PairResult {
    Done(Vec<Collected>),
    Deferred(String),
    Cancelled,
}

struct Worker {
    id: usize,
    run_id: String,
    responder: Arc<dyn Responder>,
    store: Store,
    limiter: Arc<RateLimiter>,
    policy: DispatchPolicy,
    retention: Arc<RetentionPolicy>,
    extractor: Option<Arc<MetricExtractor>>,
    queue: Arc<Mutex<VecDeque<PendingPair>>>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> (RunTally, Option<AuditError>) {
        let mut tally = RunTally::default();
        let err = self.work(&mut tally).await.err();
        if err.is_some() {
            // stop the other workers; already persisted pairs stay
            self.cancel.cancel();
        }
        (tally, err)
    }

    async fn work(&self, tally: &mut RunTally) -> Result<(), AuditError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let next = self.queue.lock().await.pop_front();
            let Some(mut pending) = next else {
                return Ok(());
            };

            match self.dispatch_pair(&pending.pair).await? {
                PairResult::Done(collected) => self.persist(&pending.pair, collected, tally)?,
                PairResult::Deferred(reason) => {
                    pending.deferrals += 1;
                    tally.deferrals += 1;
                    if pending.deferrals > self.policy.max_deferrals {
                        tracing::warn!(
                            event = "fairprobe.pair.abandoned",
                            pair_id = %pending.pair.id,
                            deferrals = pending.deferrals,
                            reason = %reason,
                        );
                        let reason = format!(
                            "pair deferred {} times: {}",
                            pending.deferrals, reason
                        );
                        let collected = self.fail_pair(&pending.pair, &reason);
                        self.persist(&pending.pair, collected, tally)?;
                    } else {
                        tracing::info!(
                            event = "fairprobe.pair.deferred",
                            pair_id = %pending.pair.id,
                            deferrals = pending.deferrals,
                            reason = %reason,
                        );
                        self.queue.lock().await.push_back(pending);
                    }
                }
                PairResult::Cancelled => {
                    tracing::info!(
                        event = "fairprobe.pair.discarded",
                        pair_id = %pending.pair.id,
                        worker = self.id,
                        "cancelled before the pair was complete"
                    );
                    return Ok(());
                }
            }
        }
    }

    async fn dispatch_pair(&self, pair: &MatchedPair) -> Result<PairResult, AuditError> {
        match self.limiter.acquire_many(pair.probes.len(), &self.cancel).await {
            Ok(()) => {}
            Err(AuditError::Cancelled) => return Ok(PairResult::Cancelled),
            Err(AuditError::RateLimitExceeded { retry_after }) => {
                // sit out the window so the pair does not burn its deferrals at once
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(PairResult::Cancelled),
                    _ = tokio::time::sleep(retry_after) => {}
                }
                return Ok(PairResult::Deferred(format!(
                    "rate limit exceeded (retry after {:?})",
                    retry_after
                )));
            }
            Err(e) => return Err(e),
        }

        let started = Instant::now();
        let mut collected = Vec::with_capacity(pair.probes.len());
        for (i, probe) in pair.probes.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(PairResult::Cancelled);
            }
            let skew = started.elapsed();
            if i > 0 && skew > self.policy.max_pair_skew {
                return Ok(PairResult::Deferred(format!(
                    "probe {} would leave {:?} after its twin (max {:?})",
                    probe.id, skew, self.policy.max_pair_skew
                )));
            }
            match self.dispatch_probe(probe).await? {
                Some(c) => collected.push(c),
                None => return Ok(PairResult::Cancelled),
            }
        }
        Ok(PairResult::Done(collected))
    }

    /// `None` when cancelled between attempts. An in-flight call is never
    /// interrupted; it completes or hits the policy timeout.
    async fn dispatch_probe(&self, probe: &Probe) -> Result<Option<Collected>, AuditError> {
        let max_attempts = self.policy.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let wait = self.policy.backoff(attempt - 1);
                tracing::warn!(
                    event = "fairprobe.probe.retry",
                    probe_id = %probe.id,
                    attempt,
                    backoff_ms = wait.as_millis() as u64,
                    error = %last_error,
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(wait) => {}
                }
                match self.limiter.acquire_blocking(1, &self.cancel).await {
                    Ok(()) => {}
                    Err(AuditError::Cancelled) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }

            let sent = Instant::now();
            let reply = timeout(self.policy.timeout, self.responder.reply(&probe.content, &[])).await;
            let latency_ms = sent.elapsed().as_millis() as u64;

            let err = match reply {
                Ok(Ok(text)) => return Ok(Some(self.answered(probe, text, latency_ms, attempt))),
                Ok(Err(e)) => AuditError::from(e),
                Err(_) => AuditError::BackendUnavailable(format!(
                    "no reply within {:?}",
                    self.policy.timeout
                )),
            };
            if err.is_fatal() {
                return Err(match err {
                    AuditError::Configuration(m) => AuditError::Configuration(format!(
                        "{} backend: {}",
                        self.responder.provider_name(),
                        m
                    )),
                    other => other,
                });
            }
            last_error = err.to_string();
        }

        tracing::warn!(
            event = "fairprobe.probe.failed",
            probe_id = %probe.id,
            attempts = max_attempts,
            error = %last_error,
        );
        Ok(Some(Collected {
            outcome: ProbeOutcome::Failed(self.failure(probe, &last_error, max_attempts)),
            metrics: None,
        }))
    }

    fn answered(&self, probe: &Probe, text: String, latency_ms: u64, attempts: u32) -> Collected {
        let mut response = Response {
            run_id: self.run_id.clone(),
            probe_id: probe.id.clone(),
            pair_id: probe.pair_id.clone(),
            group: probe.group.clone(),
            text: Some(text),
            redacted: false,
            latency_ms,
            attempts,
            received_at: Utc::now(),
        };
        let metrics = self.extractor.as_ref().map(|ex| ex.extract_record(&response));

        let raw = response.text.take().unwrap_or_default();
        let (kept, redacted) = self.retention.apply(raw);
        response.text = kept;
        response.redacted = redacted;

        Collected {
            outcome: ProbeOutcome::Answered(response),
            metrics,
        }
    }

    fn failure(&self, probe: &Probe, reason: &str, attempts: u32) -> ProbeFailure {
        ProbeFailure {
            run_id: self.run_id.clone(),
            probe_id: probe.id.clone(),
            pair_id: probe.pair_id.clone(),
            group: probe.group.clone(),
            reason: reason.to_string(),
            attempts,
            recorded_at: Utc::now(),
        }
    }

    fn fail_pair(&self, pair: &MatchedPair, reason: &str) -> Vec<Collected> {
        pair.probes
            .iter()
            .map(|p| Collected {
                outcome: ProbeOutcome::Failed(self.failure(p, reason, 0)),
                metrics: None,
            })
            .collect()
    }

    fn persist(
        &self,
        pair: &MatchedPair,
        collected: Vec<Collected>,
        tally: &mut RunTally,
    ) -> Result<(), AuditError> {
        let mut outcomes = Vec::with_capacity(collected.len());
        let mut metrics = Vec::new();
        for c in collected {
            outcomes.push(c.outcome);
            metrics.extend(c.metrics);
        }

        self.store.record_pair(&outcomes).map_err(storage)?;
        if !metrics.is_empty() {
            self.store.insert_metrics(&metrics).map_err(storage)?;
        }

        for o in &outcomes {
            match o {
                ProbeOutcome::Answered(r) => {
                    tally.responses += 1;
                    if r.is_empty() {
                        tally.empty_responses += 1;
                    }
                }
                ProbeOutcome::Failed(_) => tally.failures += 1,
            }
        }
        tally.pairs_completed += 1;
        tally.metrics_recorded += metrics.len();

        tracing::debug!(
            event = "fairprobe.pair.recorded",
            run_id = %self.run_id,
            pair_id = %pair.id,
            worker = self.id,
            outcomes = outcomes.len(),
        );
        Ok(())
    }
}
