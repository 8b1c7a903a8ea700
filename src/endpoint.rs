//! Byte-stream endpoint abstraction and link configuration.
//!
//! An [`Endpoint`] is an open, exclusively owned, bidirectional byte channel
//! to the device under test. Everything above this module talks to the DUT
//! only through this trait, so the verifier and benchmark run unchanged
//! against real serial hardware or an in-memory stub.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default block size used by the throughput benchmark.
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// Default baud rate. FT2232H channels in FIFO mode ignore it.
pub const DEFAULT_BAUD_RATE: u32 = 3_000_000;

/// Default per-call read and write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised by endpoints and by endpoint construction.
#[derive(Error, Debug)]
pub enum LinkError {
    /// No device matches the requested identifier.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device exists but the link could not be established.
    #[error("failed to open {identifier}: {message}")]
    OpenFailed {
        /// Identifier of the device that failed to open.
        identifier: String,
        /// Description of the failure.
        message: String,
    },

    /// Transport fault, short write or protocol violation.
    #[error("I/O error: {0}")]
    Io(String),

    /// The per-call deadline elapsed before any progress was made.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was stopped on request.
    #[error("cancelled")]
    Cancelled,

    /// The link configuration is unusable.
    #[error("invalid link configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for endpoint operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Classification of a [`LinkError`] for diagnostics and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkErrorKind {
    /// See [`LinkError::DeviceUnavailable`].
    DeviceUnavailable,
    /// See [`LinkError::OpenFailed`].
    OpenFailed,
    /// See [`LinkError::Io`].
    Io,
    /// See [`LinkError::Timeout`].
    Timeout,
    /// See [`LinkError::Cancelled`].
    Cancelled,
    /// See [`LinkError::InvalidConfig`].
    InvalidConfig,
}

impl LinkError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> LinkErrorKind {
        match self {
            Self::DeviceUnavailable(_) => LinkErrorKind::DeviceUnavailable,
            Self::OpenFailed { .. } => LinkErrorKind::OpenFailed,
            Self::Io(_) => LinkErrorKind::Io,
            Self::Timeout(_) => LinkErrorKind::Timeout,
            Self::Cancelled => LinkErrorKind::Cancelled,
            Self::InvalidConfig(_) => LinkErrorKind::InvalidConfig,
        }
    }
}

impl fmt::Display for LinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeviceUnavailable => "device unavailable",
            Self::OpenFailed => "open failed",
            Self::Io => "I/O error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig => "invalid config",
        };
        f.write_str(name)
    }
}

/// Opaque identifier of a physical endpoint (typically a USB serial number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(String);

impl DeviceIdentifier {
    /// Wraps an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceIdentifier {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Channel of a multi-interface bridge (FT2232 style A/B/C/D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterfaceSelector {
    /// First channel.
    #[default]
    A,
    /// Second channel.
    B,
    /// Third channel.
    C,
    /// Fourth channel.
    D,
}

impl InterfaceSelector {
    /// Zero-based USB interface number of this channel.
    pub fn index(self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
        }
    }
}

impl FromStr for InterfaceSelector {
    type Err = LinkError;

    /// Accepts channel letters (`a`, `B`) and the 1-based numbers used by
    /// FTDI tooling (`1` = A, `2` = B).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "a" | "1" => Ok(Self::A),
            "b" | "2" => Ok(Self::B),
            "c" | "3" => Ok(Self::C),
            "d" | "4" => Ok(Self::D),
            _ => Err(LinkError::InvalidConfig(format!(
                "unknown interface '{}' (expected A-D or 1-4)",
                s
            ))),
        }
    }
}

impl fmt::Display for InterfaceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        };
        f.write_str(letter)
    }
}

/// How bytes cross the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkMode {
    /// Raw bytes, no translation.
    #[default]
    Binary,
    /// Text with line translation by the driver.
    Text,
}

impl FromStr for LinkMode {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "b" | "binary" | "byte" | "bytes" => Ok(Self::Binary),
            "t" | "text" => Ok(Self::Text),
            _ => Err(LinkError::InvalidConfig(format!(
                "unknown link mode '{}' (expected binary or text)",
                s
            ))),
        }
    }
}

/// Link configuration, fixed for the lifetime of an open endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Bridge channel to open.
    pub interface: InterfaceSelector,
    /// Byte or text mode.
    pub mode: LinkMode,
    /// Block size agreed with the DUT firmware.
    pub block_size: usize,
    /// Line rate in baud.
    pub baud_rate: u32,
    /// Deadline for a single read call.
    pub read_timeout: Duration,
    /// Deadline for a single write call.
    pub write_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            interface: InterfaceSelector::default(),
            mode: LinkMode::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LinkConfig {
    /// Check that the configuration can drive a link.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::InvalidConfig` for a zero timeout or zero baud rate.
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(LinkError::InvalidConfig(
                "read and write timeouts must be non-zero".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(LinkError::InvalidConfig(
                "baud rate must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// An open bidirectional byte channel to the DUT.
///
/// Implementors are owned by exactly one driver at a time; all I/O takes
/// `&mut self`, so two components can never interleave on one link.
pub trait Endpoint {
    /// Identifier this endpoint was opened with.
    fn identifier(&self) -> &DeviceIdentifier;

    /// Queue `bytes` for transmission.
    ///
    /// Returns the number of bytes accepted. Anything less than
    /// `bytes.len()` is a short write, which callers treat as a failure.
    ///
    /// # Errors
    ///
    /// `LinkError::Timeout` when the write deadline elapses,
    /// `LinkError::Io` on a transport fault.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` bytes, blocking until at least one byte
    /// arrives or the read deadline elapses.
    ///
    /// Short reads are normal.
    ///
    /// # Errors
    ///
    /// `LinkError::Timeout` when nothing arrived in time,
    /// `LinkError::Io` on a transport fault.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Release the link. Idempotent and infallible.
    fn close(&mut self);
}

impl<E: Endpoint + ?Sized> Endpoint for Box<E> {
    fn identifier(&self) -> &DeviceIdentifier {
        (**self).identifier()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        (**self).write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// Owns an endpoint and closes it on every exit path.
pub struct EndpointGuard<E: Endpoint> {
    endpoint: E,
}

impl<E: Endpoint> EndpointGuard<E> {
    /// Take ownership of an open endpoint.
    pub fn new(endpoint: E) -> Self {
        Self { endpoint }
    }

    /// Mutable access to the guarded endpoint.
    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }
}

impl<E: Endpoint> Drop for EndpointGuard<E> {
    fn drop(&mut self) {
        log::debug!("Closing endpoint {}", self.endpoint.identifier());
        self.endpoint.close();
    }
}
