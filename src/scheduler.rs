use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::summarize;
use crate::config::BatchConfig;
use crate::probe::Probe;
use crate::target::{parse_target, redact_userinfo};
use crate::types::{ProbeOutcome, ProgressEvent, Target};

/// Extra time a probe gets past its own timeout before the scheduler abandons it.
pub const PROBE_GRACE: Duration = Duration::from_millis(100);

/// Counters readable while a run is in flight.
#[derive(Clone, Debug)]
pub struct RunProgress {
    pub processed: Arc<AtomicU64>,
    pub total: Arc<AtomicU64>,
    pub healthy: Arc<AtomicU64>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            processed: Arc::new(AtomicU64::new(0)),
            total: Arc::new(AtomicU64::new(0)),
            healthy: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcomes of a scheduler pass, in input order.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub results: Vec<ProbeOutcome>,
    /// True when cancellation stopped the pass before every group ran.
    pub cancelled: bool,
}

/// Runs probes in fixed-size groups, one group at a time.
///
/// - At most `concurrency` probes are in flight; group N+1 starts only after group N settled.
/// - Every launched probe is raced against `timeout + PROBE_GRACE`.
/// - Lines that do not parse become `invalid` outcomes and use no probe.
/// - Cancellation is checked before each group and during the inter-group delay.
pub struct BatchScheduler {
    probe: Arc<dyn Probe>,
    group_size: usize,
    timeout: Duration,
    delay: Duration,
}

impl BatchScheduler {
    pub fn new(probe: Arc<dyn Probe>, config: &BatchConfig) -> Self {
        Self {
            probe,
            group_size: config.concurrency.max(1),
            timeout: config.timeout(),
            delay: config.inter_batch_delay(),
        }
    }

    pub async fn run(
        &self,
        targets: &[String],
        cancel: &CancellationToken,
        progress: &RunProgress,
        sink: Option<&UnboundedSender<ProgressEvent>>,
    ) -> Schedule {
        let total = targets.len() as u64;
        progress.total.store(total, Ordering::Relaxed);
        let group_count = targets.len().div_ceil(self.group_size);
        let mut results: Vec<ProbeOutcome> = Vec::with_capacity(targets.len());

        for (idx, group) in targets.chunks(self.group_size).enumerate() {
            if idx > 0 && !self.delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = time::sleep(self.delay) => {}
                }
            }
            if cancel.is_cancelled() {
                info!(
                    groups_done = idx,
                    groups_total = group_count,
                    processed = results.len(),
                    "run cancelled; remaining groups skipped"
                );
                return Schedule {
                    results,
                    cancelled: true,
                };
            }

            let outcomes = self.run_group(group).await;
            let healthy = outcomes.iter().filter(|o| o.healthy).count() as u64;
            progress.healthy.fetch_add(healthy, Ordering::Relaxed);
            progress
                .processed
                .fetch_add(outcomes.len() as u64, Ordering::Relaxed);
            results.extend(outcomes.iter().cloned());

            info!(
                group = idx + 1,
                groups_total = group_count,
                processed = results.len(),
                total,
                healthy,
                "group settled"
            );

            if let Some(tx) = sink {
                // A dropped receiver only means nobody is watching.
                let _ = tx.send(ProgressEvent {
                    processed_count: results.len() as u64,
                    total_count: total,
                    new_outcomes: outcomes,
                    summary: summarize(&results),
                });
            }
        }

        Schedule {
            results,
            cancelled: false,
        }
    }

    /// Probe one group concurrently and return its outcomes in group order.
    async fn run_group(&self, group: &[String]) -> Vec<ProbeOutcome> {
        let mut slots: Vec<Option<ProbeOutcome>> = vec![None; group.len()];
        let mut parsed: Vec<Option<Target>> = Vec::with_capacity(group.len());
        let mut set = JoinSet::new();

        for (i, raw) in group.iter().enumerate() {
            match parse_target(raw) {
                Ok(target) => {
                    let probe = self.probe.clone();
                    let timeout = self.timeout;
                    let owned = target.clone();
                    set.spawn(async move { (i, guarded_probe(probe.as_ref(), &owned, timeout).await) });
                    parsed.push(Some(target));
                }
                Err(e) => {
                    debug!(endpoint = %redact_userinfo(raw.trim()), error = %e, "invalid target");
                    slots[i] = Some(ProbeOutcome::invalid(raw, e.to_string()));
                    parsed.push(None);
                }
            }
        }

        while let Some(res) = set.join_next().await {
            match res {
                Ok((i, outcome)) => slots[i] = Some(outcome),
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }

        slots
            .into_iter()
            .zip(parsed)
            .zip(group)
            .map(|((slot, target), raw)| match (slot, target) {
                (Some(outcome), _) => outcome,
                (None, Some(target)) => {
                    ProbeOutcome::error(&target, Duration::ZERO, "probe task panicked")
                }
                (None, None) => ProbeOutcome::invalid(raw, "unparsed target"),
            })
            .collect()
    }
}

/// Run one probe under the scheduler's own deadline.
async fn guarded_probe(probe: &dyn Probe, target: &Target, timeout: Duration) -> ProbeOutcome {
    let start = Instant::now();
    let mut outcome = match time::timeout(timeout + PROBE_GRACE, probe.probe(target, timeout)).await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(endpoint = %target, ?timeout, "probe overran its timeout; abandoned");
            ProbeOutcome::timed_out(target, start.elapsed())
        }
    };
    // Outcomes are keyed by the scheduler's target, whatever the probe reported.
    if outcome.target != target.display {
        outcome.target = target.display.clone();
    }
    debug!(
        endpoint = %target,
        classification = %outcome.classification,
        latency_ms = outcome.latency_ms,
        "probe settled"
    );
    outcome
}
