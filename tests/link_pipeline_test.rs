//! Integration tests for the verification pipeline.
//!
//! Exercises the public API end to end against in-memory endpoints:
//! ```text
//! Payload → Endpoint (increment DUT) → Verifier → Benchmark → Campaign → Stats
//! ```
//!
//! No serial hardware is required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use link_probe_lib::benchmark::{self, BenchmarkConfig, CancelToken, ThroughputBenchmark};
use link_probe_lib::campaign::{run_campaign, RunOutcome};
use link_probe_lib::endpoint::{DeviceIdentifier, Endpoint, LinkError, LinkErrorKind, Result};
use link_probe_lib::payload::Payload;
use link_probe_lib::test_utils::{Fault, MockEndpoint};
use link_probe_lib::verifier::{verify, LinkVerifier};

/// Endpoint that cancels a token after a number of exchanges, standing in
/// for a Ctrl-C arriving mid-run.
struct CancellingEndpoint {
    inner: MockEndpoint,
    cancel: CancelToken,
    cancel_after: usize,
}

impl Endpoint for CancellingEndpoint {
    fn identifier(&self) -> &DeviceIdentifier {
        self.inner.identifier()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let written = self.inner.write(bytes)?;
        if self.inner.writes() >= self.cancel_after {
            self.cancel.cancel();
        }
        Ok(written)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

// ============================================================================
// Verifier
// ============================================================================

#[test]
fn test_full_byte_cycle_passes() {
    let mut endpoint = MockEndpoint::new("FTZ17IRO");
    let verdict = verify(&mut endpoint, &Payload::sequential(256));

    assert!(verdict.passed, "increment DUT must pass: {}", verdict);
    assert_eq!(verdict.bytes_compared, 256);
}

#[test]
fn test_single_corrupted_byte_is_located() {
    let mut endpoint =
        MockEndpoint::new("FTZ17IRO").with_fault(Fault::CorruptByte { call: 0, index: 1000 });
    let payload = Payload::seeded(2048, 42);
    let verdict = verify(&mut endpoint, &payload);

    assert!(!verdict.passed);
    assert_eq!(verdict.first_mismatch_index, Some(1000));
    let expected = payload.as_bytes()[1000].wrapping_add(1);
    assert_eq!(verdict.expected_byte, Some(expected));
    assert_eq!(verdict.actual_byte, Some(expected ^ 0xFF));
}

#[test]
fn test_truncated_reply_is_timeout() {
    let mut endpoint =
        MockEndpoint::new("FTZ17IRO").with_fault(Fault::Truncate { call: 0, len: 100 });
    let verdict = verify(&mut endpoint, &Payload::sequential(256));

    assert!(!verdict.passed);
    assert!(!verdict.is_mismatch());
    assert_eq!(verdict.transport_error(), Some(LinkErrorKind::Timeout));
    assert_eq!(verdict.bytes_compared, 100);
}

#[test]
fn test_dribbled_reply_is_reassembled() {
    let mut endpoint = MockEndpoint::new("FTZ17IRO").with_max_chunk(7);
    let verdict = verify(&mut endpoint, &Payload::seeded(1000, 3));

    assert!(verdict.passed, "chunked reply must pass: {}", verdict);
    assert!(endpoint.reads() >= 1000 / 7);
}

#[test]
fn test_single_shot_trailing_bytes_fail() {
    let mut clean = MockEndpoint::new("FTZ17IRO");
    assert!(LinkVerifier::new().single_shot(&mut clean, 256).passed);

    let mut noisy = MockEndpoint::new("FTZ17IRO").with_trailing(1);
    let verdict = LinkVerifier::new().single_shot(&mut noisy, 256);
    assert!(!verdict.passed);
    assert_eq!(verdict.transport_error(), Some(LinkErrorKind::Io));
    assert_eq!(verdict.bytes_received, 257);
}

// ============================================================================
// Benchmark
// ============================================================================

#[test]
fn test_default_benchmark_against_correct_stub() {
    let mut endpoint = MockEndpoint::new("FTZ17IRO");
    let result = benchmark::run(&mut endpoint, 2048, 10240);

    assert_eq!(result.iterations_completed, 10240);
    assert!(result.passed());
    assert!(result.elapsed.as_nanos() > 0, "elapsed time must be measured");
    assert_eq!(result.bytes_transferred(), 2048 * 10240);
}

#[test]
fn test_benchmark_stops_on_failure() {
    let mut endpoint =
        MockEndpoint::new("FTZ17IRO").with_fault(Fault::CorruptByte { call: 2, index: 0 });
    let result = benchmark::run(&mut endpoint, 512, 100);

    assert_eq!(result.iterations_completed, 2);
    assert!(result.final_verdict.is_mismatch());
    assert_eq!(endpoint.writes(), 3, "no exchange after the failing one");
}

#[test]
fn test_benchmark_cancelled_mid_run() {
    let cancel = CancelToken::new();
    let mut endpoint = CancellingEndpoint {
        inner: MockEndpoint::new("FTZ17IRO"),
        cancel: cancel.clone(),
        cancel_after: 5,
    };
    let mut bench = ThroughputBenchmark::new(BenchmarkConfig {
        block_size: 64,
        iterations: 100,
        ..Default::default()
    });

    let result = bench.run(&mut endpoint, &cancel);

    // The in-flight exchange completes; the next one never starts
    assert_eq!(result.iterations_completed, 5);
    assert!(!result.passed());
    assert!(result.final_verdict.is_cancelled());
}

// ============================================================================
// Campaign
// ============================================================================

#[test]
fn test_campaign_statistics_exclude_failures() {
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closes);
    let factory = move |index: usize| -> Result<MockEndpoint> {
        let endpoint = MockEndpoint::new("FTZ17IRO").with_close_counter(Arc::clone(&counter));
        Ok(match index {
            1 => endpoint.with_fault(Fault::CorruptByte { call: 0, index: 0 }),
            3 => endpoint.with_fault(Fault::Truncate { call: 1, len: 0 }),
            _ => endpoint,
        })
    };
    let config = BenchmarkConfig {
        block_size: 256,
        iterations: 8,
        ..Default::default()
    };

    let summary = run_campaign(factory, &config, 5, &CancelToken::new());

    assert_eq!(summary.run_times.len(), 3);
    assert_eq!(summary.failed_runs, 2);
    assert_eq!(closes.load(Ordering::SeqCst), 5, "every endpoint closed");

    let stats = summary.stats().expect("three passing runs");
    assert_eq!(stats.samples, 3);
    assert!(stats.min <= stats.median && stats.median <= stats.max);
}

#[test]
fn test_campaign_with_unopenable_device() {
    let summary = run_campaign(
        |_| -> Result<MockEndpoint> {
            Err(LinkError::DeviceUnavailable("FTZ17IRO".to_string()))
        },
        &BenchmarkConfig::default(),
        3,
        &CancelToken::new(),
    );

    assert_eq!(summary.attempted_runs, 3);
    assert_eq!(summary.failed_runs, 3);
    assert!(summary.run_times.is_empty());
    assert!(summary.stats().is_none());
    assert!(summary
        .runs
        .iter()
        .all(|r| matches!(r.outcome, RunOutcome::OpenFailed { .. })));
}

#[test]
fn test_campaign_cancelled_during_second_run() {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    let factory = move |index: usize| -> Result<CancellingEndpoint> {
        Ok(CancellingEndpoint {
            inner: MockEndpoint::new("FTZ17IRO"),
            cancel: handle.clone(),
            cancel_after: if index == 1 { 2 } else { usize::MAX },
        })
    };
    let config = BenchmarkConfig {
        block_size: 32,
        iterations: 4,
        ..Default::default()
    };

    let summary = run_campaign(factory, &config, 5, &cancel);

    assert!(summary.cancelled);
    assert_eq!(summary.attempted_runs, 2);
    assert_eq!(summary.run_times.len(), 1);
    assert!(matches!(
        summary.runs[1].outcome,
        RunOutcome::Cancelled { .. }
    ));
}
