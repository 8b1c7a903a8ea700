//! Benchmark campaigns: repeated runs, each on a freshly opened endpoint.
//!
//! A failing run never aborts the campaign. Open failures and verification
//! failures are both counted as failed runs; only passing runs contribute a
//! timing sample, so `run_times.len() == attempted_runs - failed_runs`.

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::benchmark::{BenchmarkConfig, BenchmarkResult, CancelToken, ThroughputBenchmark};
use crate::endpoint::{Endpoint, EndpointGuard, LinkErrorKind, Result};
use crate::stats::{compute_stats, TimingStats};

/// How a single campaign run ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every iteration passed.
    Passed {
        /// The run's benchmark result.
        result: BenchmarkResult,
    },
    /// The benchmark ran but a verdict failed.
    Failed {
        /// The run's benchmark result.
        result: BenchmarkResult,
    },
    /// The endpoint could not be opened.
    OpenFailed {
        /// Error classification.
        error: LinkErrorKind,
        /// Human-readable detail.
        message: String,
    },
    /// The run was stopped on request.
    Cancelled {
        /// The partial benchmark result.
        result: BenchmarkResult,
    },
}

impl RunOutcome {
    /// Whether the run passed.
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

/// Record of one campaign run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    /// 0-based run number.
    pub index: usize,
    /// How the run ended.
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

/// Aggregated campaign results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CampaignSummary {
    /// Elapsed time of every passing run, in run order.
    #[serde(rename = "run_times_secs", serialize_with = "serialize_secs_vec")]
    pub run_times: Vec<Duration>,
    /// Runs that did not pass, including open failures and cancellations.
    pub failed_runs: usize,
    /// Runs started (endpoint open attempted).
    pub attempted_runs: usize,
    /// Whether the campaign stopped early on request.
    pub cancelled: bool,
    /// Payload bytes behind each passing run.
    pub bytes_per_run: u64,
    /// Per-run detail.
    pub runs: Vec<RunRecord>,
}

impl CampaignSummary {
    /// Timing statistics over passing runs.
    pub fn stats(&self) -> Option<TimingStats> {
        compute_stats(&self.run_times, self.bytes_per_run)
    }

    /// Whether every attempted run passed.
    pub fn all_passed(&self) -> bool {
        self.failed_runs == 0 && !self.cancelled
    }
}

/// Run `run_count` benchmarks, opening a fresh endpoint for each.
///
/// `endpoint_factory` receives the 0-based run number. The endpoint is
/// closed after every run, whatever the outcome. Cancellation ends the
/// current run early and skips the remaining ones.
pub fn run_campaign<F, E>(
    mut endpoint_factory: F,
    config: &BenchmarkConfig,
    run_count: usize,
    cancel: &CancelToken,
) -> CampaignSummary
where
    F: FnMut(usize) -> Result<E>,
    E: Endpoint,
{
    let mut bench = ThroughputBenchmark::new(config.clone());
    let mut summary = CampaignSummary {
        bytes_per_run: config.block_size as u64 * config.iterations,
        ..Default::default()
    };

    log::info!("Starting campaign of {} runs", run_count);

    for index in 0..run_count {
        if cancel.is_cancelled() {
            log::info!("Campaign cancelled before run {}", index);
            summary.cancelled = true;
            break;
        }
        summary.attempted_runs += 1;

        let outcome = match endpoint_factory(index) {
            Ok(endpoint) => {
                let mut guard = EndpointGuard::new(endpoint);
                let result = bench.run(guard.endpoint_mut(), cancel);
                drop(guard);

                if result.passed() {
                    summary.run_times.push(result.elapsed);
                    RunOutcome::Passed { result }
                } else if result.final_verdict.is_cancelled() {
                    summary.cancelled = true;
                    RunOutcome::Cancelled { result }
                } else {
                    log::error!("Run {} failed: {}", index, result.final_verdict);
                    RunOutcome::Failed { result }
                }
            }
            Err(e) => {
                log::error!("Run {} could not open endpoint: {}", index, e);
                RunOutcome::OpenFailed {
                    error: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        if !outcome.passed() {
            summary.failed_runs += 1;
        }
        summary.runs.push(RunRecord { index, outcome });
    }

    log::info!(
        "Campaign finished: {} attempted, {} failed",
        summary.attempted_runs,
        summary.failed_runs
    );
    summary
}

fn serialize_secs_vec<S: Serializer>(
    durations: &[Duration],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(durations.iter().map(Duration::as_secs_f64))
}
