//! Command-line interface for the link probe.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;

use crate::benchmark::{BenchmarkConfig, CancelToken, ThroughputBenchmark, DEFAULT_ITERATIONS};
use crate::campaign::run_campaign;
use crate::endpoint::{
    DeviceIdentifier, InterfaceSelector, LinkConfig, LinkError, LinkMode, DEFAULT_BAUD_RATE,
    DEFAULT_BLOCK_SIZE,
};
use crate::payload::Payload;
use crate::report;
use crate::serial::{list_devices, SerialEndpoint};
use crate::verifier::LinkVerifier;

/// Length of the single-shot sequential payload (one full byte cycle).
const SINGLE_SHOT_LEN: usize = 256;

/// Version string including build metadata.
const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Loopback verification and throughput benchmark for USB serial links.
///
/// The device under test must answer every byte `b` with `b + 1 (mod 256)`.
#[derive(Parser, Debug)]
#[command(name = "link-probe")]
#[command(author, version = VERSION, about, long_about = None)]
pub struct Cli {
    /// Link selection and parameters.
    #[command(flatten)]
    pub link: LinkArgs,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Options describing which link to open and how.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// USB serial number of the bridge (e.g. FTZ17IRO).
    #[arg(short = 'd', long, env = "LINK_PROBE_DEVICE", global = true)]
    pub device: Option<String>,

    /// Open this serial port directly instead of looking up the device.
    /// Takes precedence over `--device`.
    #[arg(long, env = "LINK_PROBE_PORT", global = true)]
    pub port: Option<String>,

    /// Bridge channel: A-D, or 1-4 as FTDI tools number them.
    ///
    /// The reference increment firmware is wired to channel B of its
    /// FT2232H, so most rigs need `-i B`.
    #[arg(short = 'i', long, env = "LINK_PROBE_INTERFACE", default_value = "A", global = true)]
    pub interface: InterfaceSelector,

    /// Link mode: binary or text.
    #[arg(long, env = "LINK_PROBE_MODE", default_value = "binary", global = true)]
    pub mode: LinkMode,

    /// Line rate in baud.
    #[arg(long, env = "LINK_PROBE_BAUD", default_value_t = DEFAULT_BAUD_RATE, global = true)]
    pub baud: u32,

    /// Read and write timeout in milliseconds.
    #[arg(long, env = "LINK_PROBE_TIMEOUT_MS", default_value_t = 1000, global = true)]
    pub timeout_ms: u64,

    /// Bytes per exchange.
    #[arg(short = 'b', long, env = "LINK_PROBE_BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE, global = true)]
    pub block_size: usize,
}

impl LinkArgs {
    /// Build the link configuration.
    pub fn to_config(&self) -> LinkConfig {
        let timeout = Duration::from_millis(self.timeout_ms);
        LinkConfig {
            interface: self.interface,
            mode: self.mode,
            block_size: self.block_size,
            baud_rate: self.baud,
            read_timeout: timeout,
            write_timeout: timeout,
        }
    }

    /// Check that a device or port was given.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::InvalidConfig` when neither is set.
    pub fn ensure_target(&self) -> crate::endpoint::Result<()> {
        if self.port.is_none() && self.device.is_none() {
            return Err(missing_target());
        }
        Ok(())
    }

    /// Open the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::InvalidConfig` without a device or port, and the
    /// open errors of [`SerialEndpoint`] otherwise.
    pub fn open(&self, config: &LinkConfig) -> crate::endpoint::Result<SerialEndpoint> {
        match (&self.port, &self.device) {
            (Some(port), _) => SerialEndpoint::open_path(port, config),
            (None, Some(device)) => {
                SerialEndpoint::open(&DeviceIdentifier::new(device.as_str()), config)
            }
            (None, None) => Err(missing_target()),
        }
    }
}

fn missing_target() -> LinkError {
    LinkError::InvalidConfig("no device given; pass --device or --port".to_string())
}

/// One-line description of an open link.
fn describe_link(port_name: &str, config: &LinkConfig) -> String {
    format!(
        "Link: {} (interface {}, {} baud)",
        port_name, config.interface, config.baud_rate
    )
}

/// Options shared by the benchmark commands.
#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    /// Exchanges per run.
    #[arg(short = 'n', long, default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: u64,

    /// Seed for a reproducible payload.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop a run with a timeout failure after this many milliseconds.
    #[arg(long)]
    pub deadline_ms: Option<u64>,
}

impl BenchArgs {
    fn to_config(&self, block_size: usize) -> BenchmarkConfig {
        BenchmarkConfig {
            block_size,
            iterations: self.iterations,
            seed: self.seed,
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List USB serial devices.
    List,

    /// Verify a single exchange.
    Verify {
        /// Send 0..=255 once and check that nothing trails the reply.
        #[arg(long)]
        single_shot: bool,

        /// Seed for a reproducible payload.
        #[arg(long, conflicts_with = "single_shot")]
        seed: Option<u64>,

        /// Print the sent and received bytes.
        #[arg(long)]
        dump: bool,
    },

    /// Measure sustained verified throughput.
    Bench {
        /// Benchmark options.
        #[command(flatten)]
        bench: BenchArgs,
    },

    /// Repeat the benchmark on freshly opened links and report statistics.
    Campaign {
        /// Number of runs.
        #[arg(short = 'r', long, default_value_t = 10)]
        runs: usize,

        /// Benchmark options.
        #[command(flatten)]
        bench: BenchArgs,
    },
}

/// Install a Ctrl-C handler that trips the returned token.
pub fn install_cancel_handler() -> CancelToken {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, finishing current exchange...");
        handler_token.cancel();
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }
    cancel
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// Run the parsed command. Returns whether the link checked out.
pub fn execute(cli: Cli) -> Result<bool> {
    let config = cli.link.to_config();
    config.validate().context("Invalid link configuration")?;

    match cli.command {
        Command::List => {
            let devices = list_devices().context("Failed to enumerate devices")?;
            if cli.json {
                print_json(&devices)?;
            } else {
                print!("{}", report::format_devices(&devices));
            }
            Ok(true)
        }

        Command::Verify {
            single_shot,
            seed,
            dump,
        } => {
            let mut endpoint = cli.link.open(&config).context("Failed to open link")?;
            let mut verifier = if dump {
                LinkVerifier::recording()
            } else {
                LinkVerifier::new()
            };

            let verdict = if single_shot {
                verifier.single_shot(&mut endpoint, SINGLE_SHOT_LEN)
            } else {
                let payload = match seed {
                    Some(seed) => Payload::seeded(config.block_size, seed),
                    None => Payload::random(config.block_size),
                };
                verifier.verify(&mut endpoint, &payload)
            };

            if cli.json {
                print_json(&verdict)?;
            } else {
                println!("{}", describe_link(endpoint.port_name(), endpoint.config()));
                println!("{}", report::format_verdict(&verdict));
                if let Some(exchange) = verifier.last_exchange() {
                    print!("{}", report::format_exchange(&exchange));
                }
            }
            Ok(verdict.passed)
        }

        Command::Bench { bench } => {
            let cancel = install_cancel_handler();
            let mut endpoint = cli.link.open(&config).context("Failed to open link")?;
            let result = ThroughputBenchmark::new(bench.to_config(config.block_size))
                .run(&mut endpoint, &cancel);

            if cli.json {
                print_json(&result)?;
            } else {
                println!("{}", describe_link(endpoint.port_name(), endpoint.config()));
                print!("{}", report::format_benchmark(&result));
            }
            Ok(result.passed())
        }

        Command::Campaign { runs, bench } => {
            if runs == 0 {
                bail!("--runs must be at least 1");
            }
            // Without a target every run would fail to open and read as a link failure
            cli.link.ensure_target().context("Invalid link configuration")?;
            let cancel = install_cancel_handler();
            let link = cli.link.clone();
            let summary = run_campaign(
                |index| {
                    log::debug!("Opening link for run {}", index);
                    link.open(&config)
                },
                &bench.to_config(config.block_size),
                runs,
                &cancel,
            );

            if cli.json {
                print_json(&report::CampaignReport::new(&summary))?;
            } else {
                print!("{}", report::format_campaign(&summary));
            }
            Ok(summary.all_passed())
        }
    }
}
