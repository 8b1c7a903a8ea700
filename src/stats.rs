//! Summary statistics over benchmark timing samples.

// Timing math moves between Duration nanos, f64 and usize indices on purpose.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use serde::Serialize;
use std::time::Duration;

use crate::benchmark::serialize_secs;

/// Statistics over a set of run durations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingStats {
    /// Number of samples.
    pub samples: usize,
    /// Mean duration.
    #[serde(rename = "mean_secs", serialize_with = "serialize_secs")]
    pub mean: Duration,
    /// Population standard deviation.
    #[serde(rename = "std_dev_secs", serialize_with = "serialize_secs")]
    pub std_dev: Duration,
    /// Fastest sample.
    #[serde(rename = "min_secs", serialize_with = "serialize_secs")]
    pub min: Duration,
    /// Slowest sample.
    #[serde(rename = "max_secs", serialize_with = "serialize_secs")]
    pub max: Duration,
    /// 50th percentile.
    #[serde(rename = "median_secs", serialize_with = "serialize_secs")]
    pub median: Duration,
    /// 95th percentile.
    #[serde(rename = "p95_secs", serialize_with = "serialize_secs")]
    pub p95: Duration,
    /// Bytes per second at the mean duration, when the byte count is known.
    pub mean_throughput_bytes_per_sec: Option<f64>,
}

/// Compute statistics over `samples`.
///
/// `bytes_per_sample` is the payload volume behind each sample and is only
/// used for the throughput figure. Returns `None` for an empty sample set.
pub fn compute_stats(samples: &[Duration], bytes_per_sample: u64) -> Option<TimingStats> {
    if samples.is_empty() {
        return None;
    }

    let nanos: Vec<u64> = samples.iter().map(|d| d.as_nanos() as u64).collect();
    let n = nanos.len() as f64;

    let mean_ns = nanos.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = nanos
        .iter()
        .map(|&v| {
            let diff = v as f64 - mean_ns;
            diff * diff
        })
        .sum::<f64>()
        / n;

    let mut sorted = nanos;
    sorted.sort_unstable();

    let mean_secs = mean_ns / 1_000_000_000.0;
    let mean_throughput_bytes_per_sec =
        (bytes_per_sample > 0 && mean_secs > 0.0).then(|| bytes_per_sample as f64 / mean_secs);

    Some(TimingStats {
        samples: sorted.len(),
        mean: Duration::from_nanos(mean_ns.round() as u64),
        std_dev: Duration::from_nanos(variance.sqrt().round() as u64),
        min: Duration::from_nanos(sorted[0]),
        max: Duration::from_nanos(sorted[sorted.len() - 1]),
        median: Duration::from_nanos(percentile(&sorted, 50)),
        p95: Duration::from_nanos(percentile(&sorted, 95)),
        mean_throughput_bytes_per_sec,
    })
}

/// Percentile of sorted data with linear interpolation between neighbours.
fn percentile(sorted: &[u64], p: usize) -> u64 {
    match sorted.len() {
        0 => 0,
        1 => sorted[0],
        len => {
            let idx = (p as f64 / 100.0) * (len - 1) as f64;
            let lo = idx.floor() as usize;
            let hi = (lo + 1).min(len - 1);
            let frac = idx - lo as f64;
            (sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac).round() as u64
        }
    }
}
