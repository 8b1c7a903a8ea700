//! Single-exchange link verification.
//!
//! Writes a payload, reads the same number of bytes back and checks every
//! byte against the DUT transform (`sent + 1`, wrapping). Comparison happens
//! as bytes arrive and stops at the first mismatch: once the stream is out of
//! step, later bytes carry no diagnostic value.
//!
//! Transport failures never escape as errors. They are folded into a failing
//! [`Verdict`] that records how far the exchange got and why it stopped.

use serde::Serialize;
use std::fmt;

use crate::endpoint::{Endpoint, LinkError, LinkErrorKind};
use crate::payload::{expected_reply, Payload};

/// Size of the scratch buffer used to probe for trailing bytes.
const TRAILING_PROBE_LEN: usize = 64;

/// Why an exchange did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// A received byte did not match the transform.
    Mismatch,
    /// The transport failed before the exchange completed.
    Transport {
        /// Error classification.
        error: LinkErrorKind,
        /// Human-readable detail.
        message: String,
    },
    /// The run was stopped on request.
    Cancelled,
}

/// Outcome of one verification exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Whether every byte came back transformed correctly.
    pub passed: bool,
    /// Index of the first wrong byte.
    pub first_mismatch_index: Option<usize>,
    /// Byte the DUT should have returned at that index.
    pub expected_byte: Option<u8>,
    /// Byte the DUT actually returned at that index.
    pub actual_byte: Option<u8>,
    /// Number of bytes compared, including a mismatching one.
    pub bytes_compared: usize,
    /// Number of bytes read back from the DUT.
    pub bytes_received: usize,
    /// Root cause when `passed` is false.
    pub failure: Option<Failure>,
}

impl Verdict {
    /// A passing verdict over `len` bytes.
    pub fn pass(len: usize) -> Self {
        Self {
            passed: true,
            first_mismatch_index: None,
            expected_byte: None,
            actual_byte: None,
            bytes_compared: len,
            bytes_received: len,
            failure: None,
        }
    }

    /// A data mismatch at `index`.
    pub fn mismatch(index: usize, expected: u8, actual: u8, bytes_received: usize) -> Self {
        Self {
            passed: false,
            first_mismatch_index: Some(index),
            expected_byte: Some(expected),
            actual_byte: Some(actual),
            bytes_compared: index + 1,
            bytes_received,
            failure: Some(Failure::Mismatch),
        }
    }

    /// A transport failure after `bytes_compared` good bytes.
    pub fn transport(error: &LinkError, bytes_compared: usize, bytes_received: usize) -> Self {
        Self {
            passed: false,
            first_mismatch_index: None,
            expected_byte: None,
            actual_byte: None,
            bytes_compared,
            bytes_received,
            failure: Some(Failure::Transport {
                error: error.kind(),
                message: error.to_string(),
            }),
        }
    }

    /// A run stopped on request before this exchange.
    pub fn cancelled() -> Self {
        Self {
            passed: false,
            first_mismatch_index: None,
            expected_byte: None,
            actual_byte: None,
            bytes_compared: 0,
            bytes_received: 0,
            failure: Some(Failure::Cancelled),
        }
    }

    /// Whether the failure was a data mismatch.
    pub fn is_mismatch(&self) -> bool {
        matches!(self.failure, Some(Failure::Mismatch))
    }

    /// Whether the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.failure, Some(Failure::Cancelled))
    }

    /// Transport error kind, if the transport failed.
    pub fn transport_error(&self) -> Option<LinkErrorKind> {
        match &self.failure {
            Some(Failure::Transport { error, .. }) => Some(*error),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(f, "passed ({} bytes verified)", self.bytes_compared),
            Some(Failure::Mismatch) => write!(
                f,
                "mismatch at byte {}: expected {}, got {}",
                self.first_mismatch_index.unwrap_or_default(),
                self.expected_byte.unwrap_or_default(),
                self.actual_byte.unwrap_or_default()
            ),
            Some(Failure::Transport { error, message }) => write!(
                f,
                "{} after {} bytes: {}",
                error, self.bytes_compared, message
            ),
            Some(Failure::Cancelled) => write!(f, "cancelled"),
        }
    }
}

/// Sent and received bytes of the most recent exchange.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    /// Bytes written to the DUT.
    pub sent: &'a [u8],
    /// Bytes read back, possibly fewer than sent.
    pub received: &'a [u8],
}

/// Reusable verifier holding the receive buffer across exchanges.
#[derive(Debug, Default)]
pub struct LinkVerifier {
    rx: Vec<u8>,
    rx_len: usize,
    sent: Vec<u8>,
    record: bool,
    exchanged: bool,
}

impl LinkVerifier {
    /// Creates a verifier that does not keep exchange copies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a verifier that keeps the last exchange for [`Self::last_exchange`].
    pub fn recording() -> Self {
        Self {
            record: true,
            ..Self::default()
        }
    }

    /// The last exchange, when recording is enabled.
    pub fn last_exchange(&self) -> Option<Exchange<'_>> {
        (self.record && self.exchanged).then(|| Exchange {
            sent: &self.sent,
            received: &self.rx[..self.rx_len],
        })
    }

    /// Run one exchange of `payload` over `endpoint`.
    pub fn verify<E: Endpoint + ?Sized>(&mut self, endpoint: &mut E, payload: &Payload) -> Verdict {
        let sent = payload.as_bytes();
        self.rx_len = 0;
        self.exchanged = true;
        if self.record {
            self.sent.clear();
            self.sent.extend_from_slice(sent);
        }

        if sent.is_empty() {
            return Verdict::pass(0);
        }

        match endpoint.write(sent) {
            Ok(n) if n == sent.len() => {}
            Ok(n) => {
                let err = LinkError::Io(format!("short write: {} of {} bytes", n, sent.len()));
                log::debug!("{}", err);
                return Verdict::transport(&err, 0, 0);
            }
            Err(e) => {
                log::debug!("Write failed: {}", e);
                return Verdict::transport(&e, 0, 0);
            }
        }

        if self.rx.len() < sent.len() {
            self.rx.resize(sent.len(), 0);
        }

        let mut received = 0;
        while received < sent.len() {
            let wanted = sent.len() - received;
            let n = match endpoint.read(&mut self.rx[received..sent.len()]) {
                Ok(0) => {
                    let err = LinkError::Io("endpoint reported end of stream".to_string());
                    return Verdict::transport(&err, received, received);
                }
                Ok(n) if n > wanted => {
                    let err = LinkError::Io(format!(
                        "read returned {} bytes, only {} requested",
                        n, wanted
                    ));
                    log::debug!("{}", err);
                    return Verdict::transport(&err, received, received);
                }
                Ok(n) => n,
                Err(e) => {
                    log::debug!("Read failed after {} of {} bytes: {}", received, sent.len(), e);
                    return Verdict::transport(&e, received, received);
                }
            };

            let chunk_end = received + n;
            self.rx_len = chunk_end;
            for i in received..chunk_end {
                let expected = expected_reply(sent[i]);
                let actual = self.rx[i];
                if actual != expected {
                    log::debug!(
                        "Mismatch at byte {}: sent {}, expected {}, got {}",
                        i,
                        sent[i],
                        expected,
                        actual
                    );
                    return Verdict::mismatch(i, expected, actual, chunk_end);
                }
            }
            received = chunk_end;
        }

        Verdict::pass(sent.len())
    }

    /// Deterministic one-off check: send `0..len` and verify the reply.
    ///
    /// After a passing exchange one more bounded read is made. A timeout
    /// there is the expected outcome; any extra byte means the DUT replied
    /// with more than it was sent and fails the verdict.
    pub fn single_shot<E: Endpoint + ?Sized>(&mut self, endpoint: &mut E, len: usize) -> Verdict {
        let payload = Payload::sequential(len);
        let verdict = self.verify(endpoint, &payload);
        if !verdict.passed || len == 0 {
            return verdict;
        }

        let mut probe = [0u8; TRAILING_PROBE_LEN];
        match endpoint.read(&mut probe) {
            Err(LinkError::Timeout(_)) | Ok(0) => verdict,
            Ok(n) => {
                log::warn!("Device sent {} unexpected trailing bytes", n);
                let err = LinkError::Io(format!("device sent {} unexpected trailing bytes", n));
                Verdict::transport(&err, verdict.bytes_compared, verdict.bytes_received + n)
            }
            Err(e) => Verdict::transport(&e, verdict.bytes_compared, verdict.bytes_received),
        }
    }
}

/// Run one exchange with a throwaway verifier.
pub fn verify<E: Endpoint + ?Sized>(endpoint: &mut E, payload: &Payload) -> Verdict {
    LinkVerifier::new().verify(endpoint, payload)
}
