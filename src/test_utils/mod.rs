//! Test utilities for `link-probe`
//!
//! Provides in-memory endpoints with scripted faults for exercising the
//! verifier, benchmark and campaign runner without physical hardware.

pub mod mock_endpoint;

pub use mock_endpoint::*;
