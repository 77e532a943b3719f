use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use ::time::{format_description::well_known, OffsetDateTime};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::info;

use crate::aggregate::summarize;
use crate::config::BatchConfig;
use crate::error::{ConfigError, RunError};
use crate::probe::{probe_for_kind, Probe};
use crate::scheduler::{BatchScheduler, RunProgress};
use crate::types::{ProgressEvent, Report, RunState};

/// Entry point for one or more probe runs sharing a probe and a configuration.
pub struct Prober {
    probe: Arc<dyn Probe>,
    config: BatchConfig,
}

impl Prober {
    pub fn new(probe: Arc<dyn Probe>, config: BatchConfig) -> Self {
        Self { probe, config }
    }

    /// Use the built-in probe named by `config.probe_kind`.
    pub fn from_config(config: BatchConfig) -> Self {
        let probe = probe_for_kind(&config);
        Self::new(probe, config)
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Validate the configuration and spawn the run on the current tokio runtime.
    ///
    /// Returns as soon as the run is spawned. `sink` receives one [`ProgressEvent`]
    /// per settled group, in completion order.
    pub fn start(
        &self,
        targets: Vec<String>,
        sink: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<RunHandle, ConfigError> {
        self.config.validate()?;

        let cancel = CancellationToken::new();
        let progress = RunProgress::new();
        progress
            .total
            .store(targets.len() as u64, Ordering::Relaxed);
        let state = Arc::new(AtomicU8::new(STATE_RUNNING));

        let scheduler = BatchScheduler::new(self.probe.clone(), &self.config);
        let deadline = self.config.run_deadline(targets.len());
        let concurrency = self.config.concurrency;
        let kind = self.config.probe_kind;

        let task = {
            let cancel = cancel.clone();
            let progress = progress.clone();
            let state = state.clone();
            tokio::spawn(async move {
                let started_at = now_rfc3339();
                info!(
                    targets = targets.len(),
                    concurrency,
                    ?kind,
                    ?deadline,
                    "probe run started"
                );

                let schedule = scheduler
                    .run(&targets, &cancel, &progress, sink.as_ref())
                    .await;
                let summary = summarize(&schedule.results);
                state.store(
                    if schedule.cancelled {
                        STATE_CANCELLED
                    } else {
                        STATE_COMPLETED
                    },
                    Ordering::Release,
                );

                info!(
                    processed = schedule.results.len(),
                    healthy = summary.healthy_count,
                    unhealthy = summary.unhealthy_count,
                    avg_latency_ms = summary.average_latency_ms_of_healthy,
                    cancelled = schedule.cancelled,
                    "probe run finished"
                );

                Report {
                    results: schedule.results,
                    summary,
                    total_targets: targets.len() as u64,
                    cancelled: schedule.cancelled,
                    started_at,
                    finished_at: now_rfc3339(),
                }
            })
        };

        Ok(RunHandle {
            guard: cancel.clone().drop_guard(),
            cancel,
            progress,
            state,
            task,
        })
    }

    /// Start a run and wait for its report.
    pub async fn run(
        &self,
        targets: Vec<String>,
        sink: Option<UnboundedSender<ProgressEvent>>,
    ) -> Result<Report, RunError> {
        self.start(targets, sink)?.report().await
    }
}

const STATE_RUNNING: u8 = 0;
const STATE_COMPLETED: u8 = 1;
const STATE_CANCELLED: u8 = 2;

/// Handle to one in-flight run.
///
/// Dropping the handle without awaiting [`RunHandle::report`] cancels the run at
/// its next group boundary.
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancellationToken,
    progress: RunProgress,
    state: Arc<AtomicU8>,
    task: JoinHandle<Report>,
    guard: DropGuard,
}

impl RunHandle {
    /// Stop launching new groups. Idempotent, and a no-op once the run finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run, for wiring into signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn processed(&self) -> u64 {
        self.progress.processed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.progress.total.load(Ordering::Relaxed)
    }

    pub fn healthy(&self) -> u64 {
        self.progress.healthy.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> RunState {
        match self.state.load(Ordering::Acquire) {
            STATE_COMPLETED => RunState::Completed,
            STATE_CANCELLED => RunState::Cancelled,
            _ => RunState::Running,
        }
    }

    /// Wait for the run to finish and take its report.
    pub async fn report(self) -> Result<Report, RunError> {
        let RunHandle { task, guard, .. } = self;
        let report = task.await?;
        guard.disarm();
        Ok(report)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
