//! Sustained-throughput benchmark.
//!
//! One payload is generated up front and reused for every iteration, so the
//! measured time is transport cost only. Iterations run strictly in sequence
//! and the loop stops at the first failing verdict.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::endpoint::{Endpoint, LinkError, DEFAULT_BLOCK_SIZE};
use crate::payload::Payload;
use crate::verifier::{LinkVerifier, Verdict};

/// Default number of iterations per benchmark run.
pub const DEFAULT_ITERATIONS: u64 = 10 * 1024;

/// Shared stop flag, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Takes effect before the next iteration.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Benchmark parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Bytes per exchange.
    pub block_size: usize,
    /// Exchanges per run.
    pub iterations: u64,
    /// Seed for a reproducible payload; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Time budget; the run stops with a timeout failure once exceeded.
    pub deadline: Option<Duration>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            iterations: DEFAULT_ITERATIONS,
            seed: None,
            deadline: None,
        }
    }
}

/// Outcome of one benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    /// Iterations that passed before the run ended.
    pub iterations_completed: u64,
    /// Iterations the run was configured for.
    pub iterations_configured: u64,
    /// Bytes per exchange.
    pub block_size: usize,
    /// Wall-clock time from the first exchange to the end of the loop.
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Last verdict observed.
    pub final_verdict: Verdict,
}

impl BenchmarkResult {
    /// Whether every configured iteration passed.
    pub fn passed(&self) -> bool {
        self.final_verdict.passed
    }

    /// Payload bytes successfully looped through the DUT.
    pub fn bytes_transferred(&self) -> u64 {
        self.block_size as u64 * self.iterations_completed
    }

    /// Verified bytes per second, if anything was transferred.
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput_bytes_per_sec(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        let bytes = self.bytes_transferred();
        (bytes > 0 && secs > 0.0).then(|| bytes as f64 / secs)
    }
}

/// Reusable benchmark driver.
#[derive(Debug)]
pub struct ThroughputBenchmark {
    config: BenchmarkConfig,
    verifier: LinkVerifier,
}

impl ThroughputBenchmark {
    /// Creates a benchmark with the given parameters.
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            config,
            verifier: LinkVerifier::new(),
        }
    }

    /// Run the benchmark over `endpoint`.
    ///
    /// `cancel` is polled before each iteration, never during an exchange.
    pub fn run<E: Endpoint + ?Sized>(
        &mut self,
        endpoint: &mut E,
        cancel: &CancelToken,
    ) -> BenchmarkResult {
        let config = &self.config;
        let payload = match config.seed {
            Some(seed) => Payload::seeded(config.block_size, seed),
            None => Payload::random(config.block_size),
        };

        log::info!(
            "Benchmark on {}: {} iterations of {} bytes",
            endpoint.identifier(),
            config.iterations,
            config.block_size
        );

        let start = Instant::now();
        let mut completed = 0u64;
        let mut final_verdict = Verdict::pass(0);

        while completed < config.iterations {
            if cancel.is_cancelled() {
                log::info!("Benchmark cancelled after {} iterations", completed);
                final_verdict = Verdict::cancelled();
                break;
            }
            if let Some(deadline) = config.deadline {
                if start.elapsed() >= deadline {
                    log::warn!(
                        "Benchmark deadline {:?} reached after {} iterations",
                        deadline,
                        completed
                    );
                    final_verdict = Verdict::transport(&LinkError::Timeout(deadline), 0, 0);
                    break;
                }
            }

            let verdict = self.verifier.verify(endpoint, &payload);
            if !verdict.passed {
                log::warn!("Epoch {} failed: {}", completed, verdict);
                final_verdict = verdict;
                break;
            }
            completed += 1;
            final_verdict = verdict;
        }

        let elapsed = start.elapsed();
        log::info!(
            "Benchmark finished: {}/{} iterations in {:.6} s",
            completed,
            config.iterations,
            elapsed.as_secs_f64()
        );

        BenchmarkResult {
            iterations_completed: completed,
            iterations_configured: config.iterations,
            block_size: config.block_size,
            elapsed,
            final_verdict,
        }
    }
}

/// Run `iteration_count` exchanges of `block_size` random bytes.
pub fn run<E: Endpoint + ?Sized>(
    endpoint: &mut E,
    block_size: usize,
    iteration_count: u64,
) -> BenchmarkResult {
    ThroughputBenchmark::new(BenchmarkConfig {
        block_size,
        iterations: iteration_count,
        ..Default::default()
    })
    .run(endpoint, &CancelToken::new())
}

pub(crate) fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
