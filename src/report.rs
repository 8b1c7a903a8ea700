//! Human-readable and JSON rendering of probe results.

use serde::Serialize;
use std::fmt::Write as _;

use crate::benchmark::BenchmarkResult;
use crate::campaign::{CampaignSummary, RunOutcome};
use crate::serial::DeviceInfo;
use crate::stats::TimingStats;
use crate::verifier::{Exchange, Verdict};

/// Bytes per hex-dump row.
const HEX_ROW_WIDTH: usize = 16;

/// Campaign summary together with its derived statistics, for JSON output.
#[derive(Debug, Serialize)]
pub struct CampaignReport<'a> {
    /// Raw campaign summary.
    #[serde(flatten)]
    pub summary: &'a CampaignSummary,
    /// Timing statistics over passing runs.
    pub stats: Option<TimingStats>,
}

impl<'a> CampaignReport<'a> {
    /// Wrap a summary, computing its statistics.
    pub fn new(summary: &'a CampaignSummary) -> Self {
        Self {
            summary,
            stats: summary.stats(),
        }
    }
}

/// Format a byte rate with a binary unit prefix.
#[allow(clippy::cast_precision_loss)]
pub fn format_rate(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;

    if bytes_per_sec >= MIB {
        format!("{:.2} MiB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= KIB {
        format!("{:.2} KiB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

/// Render `bytes` as offset-prefixed hex rows.
pub fn hex_rows(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(HEX_ROW_WIDTH)
        .enumerate()
        .map(|(row, chunk)| {
            let mut line = format!("{:06x}:", row * HEX_ROW_WIDTH);
            for byte in chunk {
                let _ = write!(line, " {:02x}", byte);
            }
            line
        })
        .collect()
}

/// Render a recorded exchange as two hex dumps.
pub fn format_exchange(exchange: &Exchange<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Sent ({} bytes):", exchange.sent.len());
    for row in hex_rows(exchange.sent) {
        let _ = writeln!(out, "  {}", row);
    }
    let _ = writeln!(out, "Received ({} bytes):", exchange.received.len());
    for row in hex_rows(exchange.received) {
        let _ = writeln!(out, "  {}", row);
    }
    out
}

/// One-line verdict summary.
pub fn format_verdict(verdict: &Verdict) -> String {
    let status = if verdict.passed { "PASS" } else { "FAIL" };
    format!("{}: {}", status, verdict)
}

/// Multi-line benchmark summary.
pub fn format_benchmark(result: &BenchmarkResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Iterations: {}/{} of {} bytes",
        result.iterations_completed, result.iterations_configured, result.block_size
    );
    let _ = writeln!(out, "Elapsed:    {:.6} s", result.elapsed.as_secs_f64());
    if let Some(rate) = result.throughput_bytes_per_sec() {
        let _ = writeln!(out, "Throughput: {}", format_rate(rate));
    }
    let _ = writeln!(out, "Result:     {}", format_verdict(&result.final_verdict));
    out
}

/// Multi-line campaign summary with per-run detail.
pub fn format_campaign(summary: &CampaignSummary) -> String {
    let mut out = String::new();
    for record in &summary.runs {
        let line = match &record.outcome {
            RunOutcome::Passed { result } => {
                format!("ok      {:.6} s", result.elapsed.as_secs_f64())
            }
            RunOutcome::Failed { result } => format!(
                "FAILED  after {} iterations: {}",
                result.iterations_completed, result.final_verdict
            ),
            RunOutcome::OpenFailed { message, .. } => format!("FAILED  open: {}", message),
            RunOutcome::Cancelled { result } => {
                format!("CANCELLED after {} iterations", result.iterations_completed)
            }
        };
        let _ = writeln!(out, "Run {:>3}: {}", record.index, line);
    }

    let _ = writeln!(
        out,
        "Runs: {} attempted, {} failed{}",
        summary.attempted_runs,
        summary.failed_runs,
        if summary.cancelled { " (cancelled)" } else { "" }
    );

    if let Some(stats) = summary.stats() {
        let _ = writeln!(
            out,
            "Time (s): mean {:.6}  std dev {:.6}  min {:.6}  max {:.6}",
            stats.mean.as_secs_f64(),
            stats.std_dev.as_secs_f64(),
            stats.min.as_secs_f64(),
            stats.max.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "          median {:.6}  p95 {:.6}",
            stats.median.as_secs_f64(),
            stats.p95.as_secs_f64()
        );
        if let Some(rate) = stats.mean_throughput_bytes_per_sec {
            let _ = writeln!(out, "Mean throughput: {}", format_rate(rate));
        }
    }
    out
}

/// Table of enumerated devices.
pub fn format_devices(devices: &[DeviceInfo]) -> String {
    if devices.is_empty() {
        return "No USB serial devices found\n".to_string();
    }

    let mut out = String::new();
    for device in devices {
        let _ = writeln!(
            out,
            "{:<16} {:04x}:{:04x}  serial={}  interface={}  {} {}",
            device.port_name,
            device.vid,
            device.pid,
            device.serial_number.as_deref().unwrap_or("-"),
            device
                .interface
                .map_or_else(|| "-".to_string(), |i| i.to_string()),
            device.manufacturer.as_deref().unwrap_or(""),
            device.product.as_deref().unwrap_or("")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::{BenchmarkConfig, CancelToken};
    use crate::campaign::run_campaign;
    use crate::test_utils::MockEndpoint;
    use std::time::Duration;

    #[test]
    fn test_format_rate_units() {
        assert_eq!(format_rate(512.0), "512 B/s");
        assert_eq!(format_rate(2048.0), "2.00 KiB/s");
        assert_eq!(format_rate(3.0 * 1024.0 * 1024.0), "3.00 MiB/s");
    }

    #[test]
    fn test_hex_rows() {
        let bytes: Vec<u8> = (0..20).collect();
        let rows = hex_rows(&bytes);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            "000000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f"
        );
        assert_eq!(rows[1], "000010: 10 11 12 13");
        assert!(hex_rows(&[]).is_empty());
    }

    #[test]
    fn test_format_exchange() {
        let exchange = Exchange {
            sent: &[0x00, 0xff],
            received: &[0x01],
        };
        let text = format_exchange(&exchange);
        assert!(text.contains("Sent (2 bytes):"));
        assert!(text.contains("000000: 00 ff"));
        assert!(text.contains("Received (1 bytes):"));
        assert!(text.contains("000000: 01"));
    }

    #[test]
    fn test_format_verdict() {
        assert_eq!(
            format_verdict(&Verdict::mismatch(3, 4, 9, 8)),
            "FAIL: mismatch at byte 3: expected 4, got 9"
        );
        assert!(format_verdict(&Verdict::pass(8)).starts_with("PASS"));
    }

    #[test]
    fn test_format_benchmark() {
        let result = BenchmarkResult {
            iterations_completed: 4,
            iterations_configured: 4,
            block_size: 1024,
            elapsed: Duration::from_secs(1),
            final_verdict: Verdict::pass(1024),
        };
        let text = format_benchmark(&result);
        assert!(text.contains("Iterations: 4/4 of 1024 bytes"));
        assert!(text.contains("Throughput: 4.00 KiB/s"));
    }

    #[test]
    fn test_format_campaign_and_json() {
        let config = BenchmarkConfig {
            block_size: 16,
            iterations: 2,
            ..Default::default()
        };
        let summary = run_campaign(
            |_| Ok(MockEndpoint::correct()),
            &config,
            3,
            &CancelToken::new(),
        );
        let text = format_campaign(&summary);
        assert!(text.contains("Run   0: ok"));
        assert!(text.contains("Runs: 3 attempted, 0 failed"));
        assert!(text.contains("Time (s): mean"));

        let json = serde_json::to_value(CampaignReport::new(&summary)).unwrap();
        assert_eq!(json["attempted_runs"], 3);
        assert_eq!(json["stats"]["samples"], 3);
    }

    #[test]
    fn test_format_devices() {
        assert_eq!(format_devices(&[]), "No USB serial devices found\n");

        let devices = [DeviceInfo {
            port_name: "/dev/ttyUSB1".to_string(),
            vid: 0x0403,
            pid: 0x6010,
            serial_number: Some("FTZ17IRO".to_string()),
            manufacturer: Some("FTDI".to_string()),
            product: None,
            interface: Some(1),
        }];
        let text = format_devices(&devices);
        assert!(text.contains("0403:6010"));
        assert!(text.contains("serial=FTZ17IRO"));
        assert!(text.contains("interface=1"));
    }
}
