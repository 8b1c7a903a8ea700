//! `link-probe` command-line entry point
//!
//! This binary crate only forwards to the library's [`link_probe_lib::run`].

use std::process::ExitCode;

fn main() -> ExitCode {
    link_probe_lib::run()
}
