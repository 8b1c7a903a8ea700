//! `link-probe` - loopback verification and throughput benchmarking for
//! USB serial links
//!
//! The device under test answers every byte `b` with `b + 1 (mod 256)`.
//! [`verifier`] checks single exchanges against that transform,
//! [`benchmark`] measures sustained verified throughput and [`campaign`]
//! repeats benchmarks on freshly opened links to gather timing statistics.

pub mod benchmark;
pub mod campaign;
pub mod cli;
pub mod endpoint;
pub mod payload;
pub mod report;
pub mod serial;
pub mod stats;
pub mod verifier;

/// Stub endpoints for exercising the verifier without hardware.
pub mod test_utils;

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;

pub use endpoint::{Endpoint, LinkConfig, LinkError, LinkErrorKind, Result};
pub use verifier::Verdict;

/// Exit code when the probe ran but the link failed verification.
const EXIT_LINK_FAILED: u8 = 1;

/// Exit code when the probe could not run at all.
const EXIT_ERROR: u8 = 2;

/// Build information
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    /// Crate version from Cargo.toml
    pub version: String,
    /// Git commit hash (short)
    pub git_hash: String,
    /// Build timestamp
    pub build_time: String,
}

/// Get build information (version, git hash, build time)
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("BUILD_GIT_HASH").to_string(),
        build_time: env!("BUILD_TIMESTAMP").to_string(),
    }
}

/// Parse the command line, run it and map the outcome to an exit code.
pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();

    let info = build_info();
    log::info!(
        "link-probe {} ({}, built {}) starting",
        info.version,
        info.git_hash,
        info.build_time
    );

    match cli::execute(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_LINK_FAILED),
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_info_is_populated() {
        let info = build_info();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(!info.git_hash.is_empty());
        assert!(!info.build_time.is_empty());
    }
}
