//! Process-level owner of all pipelines.

use std::future::Future;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::collector::Collector;
use crate::pipeline::runner::{Pipeline, PipelineFailure, PipelineHandle, PipelineReport};
use crate::pipeline::stats::StatsSnapshot;

/// Exit code for a clean shutdown.
pub const EXIT_CLEAN: u8 = 0;

/// Exit code when records were lost at shutdown or a pipeline failed.
pub const EXIT_DEGRADED: u8 = 2;

/// Spawns pipelines against one shared shutdown token and collects their
/// reports.
///
/// Pipelines are independent: a panic in one is reported as a failure and
/// never stops the others.
#[derive(Debug, Default)]
pub struct Supervisor {
    shutdown: CancellationToken,
    pipelines: Vec<PipelineHandle>,
}

/// Outcome of a supervised shutdown.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SupervisorReport {
    pub stopped: Vec<PipelineReport>,
    #[serde(skip)]
    pub failed: Vec<PipelineFailure>,
}

impl SupervisorReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.stopped.iter().all(PipelineReport::is_clean)
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        if self.is_clean() {
            EXIT_CLEAN
        } else {
            EXIT_DEGRADED
        }
    }

    /// Counters summed over every pipeline, failed ones included.
    pub fn totals(&self) -> StatsSnapshot {
        self.stopped
            .iter()
            .map(|r| &r.stats)
            .chain(self.failed.iter().map(|f| &f.stats))
            .fold(StatsSnapshot::default(), |mut acc, s| {
                acc.collected += s.collected;
                acc.collection_failures += s.collection_failures;
                acc.delivered += s.delivered;
                acc.retries += s.retries;
                acc.dead_lettered += s.dead_lettered;
                acc.dropped_overflow += s.dropped_overflow;
                acc.delivered_after_eviction += s.delivered_after_eviction;
                acc.dropped_at_shutdown += s.dropped_at_shutdown;
                acc
            })
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pipeline under this supervisor.
    pub fn spawn<C: Collector>(&mut self, pipeline: Pipeline<C>) -> &PipelineHandle {
        let handle = pipeline.start(self.shutdown.clone());
        self.pipelines.push(handle);
        &self.pipelines[self.pipelines.len() - 1]
    }

    /// Token that stops every pipeline when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pipelines(&self) -> &[PipelineHandle] {
        &self.pipelines
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Wait for `signal`, then shut everything down.
    pub async fn run_until<F>(self, signal: F) -> SupervisorReport
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => {}
            _ = self.shutdown.cancelled() => {}
        }
        self.shutdown().await
    }

    /// Broadcast shutdown and wait for every pipeline to stop.
    pub async fn shutdown(self) -> SupervisorReport {
        tracing::info!(pipelines = self.pipelines.len(), "Shutting down pipelines");
        self.shutdown.cancel();
        self.wait().await
    }

    /// Wait for every pipeline to stop without requesting shutdown.
    pub async fn wait(self) -> SupervisorReport {
        let mut report = SupervisorReport::default();
        // All pipelines drain concurrently; joining in order only affects
        // when each report is collected.
        for handle in self.pipelines {
            match handle.join().await {
                Ok(stopped) => report.stopped.push(stopped),
                Err(failure) => {
                    tracing::error!(
                        pipeline = %failure.name,
                        error = %failure.error,
                        "Pipeline failed"
                    );
                    report.failed.push(failure);
                }
            }
        }

        let totals = report.totals();
        tracing::info!(
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            delivered = totals.delivered,
            dead_lettered = totals.dead_lettered,
            dropped_overflow = totals.dropped_overflow,
            dropped_at_shutdown = totals.dropped_at_shutdown,
            "All pipelines stopped"
        );
        report
    }
}
