//! In-memory DUT stub
//!
//! [`MockEndpoint`] behaves like firmware applying the increment transform:
//! every write queues `b + 1` for each byte, and reads drain that queue.
//! Faults can be scripted per exchange (counted by write calls) to simulate
//! corruption, truncated replies, short writes and misbehaving drivers.
//!
//! # Example
//!
//! ```rust
//! use link_probe_lib::payload::Payload;
//! use link_probe_lib::test_utils::{Fault, MockEndpoint};
//! use link_probe_lib::verifier::verify;
//!
//! let mut endpoint = MockEndpoint::correct().with_fault(Fault::CorruptByte { call: 0, index: 3 });
//! let verdict = verify(&mut endpoint, &Payload::sequential(8));
//! assert_eq!(verdict.first_mismatch_index, Some(3));
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::{DeviceIdentifier, Endpoint, LinkError, Result};
use crate::payload::expected_reply;

/// Nominal timeout reported by scripted timeouts and empty reads.
const MOCK_TIMEOUT: Duration = Duration::from_millis(1);

/// A scripted misbehaviour. `call` is the 0-based write (exchange) number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Flip the reply byte at `index`.
    CorruptByte {
        /// Exchange to corrupt.
        call: usize,
        /// Byte index within the reply.
        index: usize,
    },
    /// Reply with only the first `len` bytes, then time out.
    Truncate {
        /// Exchange to truncate.
        call: usize,
        /// Bytes actually returned.
        len: usize,
    },
    /// Accept one byte fewer than offered.
    ShortWrite {
        /// Exchange whose write falls short.
        call: usize,
    },
    /// Fail the write with a timeout.
    WriteTimeout {
        /// Exchange whose write times out.
        call: usize,
    },
    /// Fail the first read with an I/O error.
    ReadError {
        /// Exchange whose read fails.
        call: usize,
    },
    /// Claim one byte more than the read buffer holds.
    OverRead {
        /// Exchange whose read over-reports.
        call: usize,
    },
}

impl Fault {
    fn call(self) -> usize {
        match self {
            Self::CorruptByte { call, .. }
            | Self::Truncate { call, .. }
            | Self::ShortWrite { call }
            | Self::WriteTimeout { call }
            | Self::ReadError { call }
            | Self::OverRead { call } => call,
        }
    }
}

/// In-memory endpoint applying the increment transform.
#[derive(Debug)]
pub struct MockEndpoint {
    identifier: DeviceIdentifier,
    pending: VecDeque<u8>,
    faults: Vec<Fault>,
    max_chunk: usize,
    trailing: usize,
    writes: usize,
    reads: usize,
    read_fault: Option<Fault>,
    closed: bool,
    close_counter: Option<Arc<AtomicUsize>>,
}

impl Default for MockEndpoint {
    fn default() -> Self {
        Self::new("MOCK0001")
    }
}

impl MockEndpoint {
    /// Create a correct stub with the given identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: DeviceIdentifier::new(identifier),
            pending: VecDeque::new(),
            faults: Vec::new(),
            max_chunk: usize::MAX,
            trailing: 0,
            writes: 0,
            reads: 0,
            read_fault: None,
            closed: false,
            close_counter: None,
        }
    }

    /// A correct stub with the default identifier.
    pub fn correct() -> Self {
        Self::default()
    }

    /// Add a scripted fault.
    #[must_use]
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Limit every read to at most `max_chunk` bytes.
    #[must_use]
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = max_chunk.max(1);
        self
    }

    /// Append `extra` junk bytes after every reply.
    #[must_use]
    pub fn with_trailing(mut self, extra: usize) -> Self {
        self.trailing = extra;
        self
    }

    /// Count closes into a shared counter that outlives the endpoint.
    #[must_use]
    pub fn with_close_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.close_counter = Some(counter);
        self
    }

    /// Number of write calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Number of read calls so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Whether [`Endpoint::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn fault_for(&self, call: usize) -> Option<Fault> {
        self.faults.iter().copied().find(|f| f.call() == call)
    }
}

impl Endpoint for MockEndpoint {
    fn identifier(&self) -> &DeviceIdentifier {
        &self.identifier
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(LinkError::Io("endpoint closed".to_string()));
        }
        let call = self.writes;
        self.writes += 1;
        let fault = self.fault_for(call);
        self.read_fault = None;

        let accepted = match fault {
            Some(Fault::WriteTimeout { .. }) => return Err(LinkError::Timeout(MOCK_TIMEOUT)),
            Some(Fault::ShortWrite { .. }) => bytes.len().saturating_sub(1),
            _ => bytes.len(),
        };

        let mut reply: Vec<u8> = bytes[..accepted].iter().map(|&b| expected_reply(b)).collect();
        match fault {
            Some(Fault::CorruptByte { index, .. }) => {
                if let Some(byte) = reply.get_mut(index) {
                    *byte ^= 0xFF;
                }
            }
            Some(Fault::Truncate { len, .. }) => reply.truncate(len),
            Some(f @ (Fault::ReadError { .. } | Fault::OverRead { .. })) => {
                self.read_fault = Some(f);
            }
            _ => {}
        }
        reply.extend(std::iter::repeat(0xA5).take(self.trailing));

        self.pending.extend(reply);
        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(LinkError::Io("endpoint closed".to_string()));
        }
        self.reads += 1;

        match self.read_fault.take() {
            Some(Fault::ReadError { .. }) => {
                return Err(LinkError::Io("simulated transport fault".to_string()));
            }
            Some(Fault::OverRead { .. }) => {
                let n = buf.len().min(self.pending.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = self.pending.pop_front().unwrap_or_default();
                }
                return Ok(buf.len() + 1);
            }
            _ => {}
        }

        if self.pending.is_empty() {
            return Err(LinkError::Timeout(MOCK_TIMEOUT));
        }

        let n = buf.len().min(self.max_chunk).min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        if let Some(counter) = &self.close_counter {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_is_incremented() {
        let mut endpoint = MockEndpoint::correct();
        assert_eq!(endpoint.write(&[0, 1, 255]).unwrap(), 3);

        let mut buf = [0u8; 3];
        assert_eq!(endpoint.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 0]);
    }

    #[test]
    fn test_empty_read_times_out() {
        let mut endpoint = MockEndpoint::correct();
        let mut buf = [0u8; 4];
        assert!(matches!(
            endpoint.read(&mut buf),
            Err(LinkError::Timeout(_))
        ));
    }

    #[test]
    fn test_max_chunk_limits_reads() {
        let mut endpoint = MockEndpoint::correct().with_max_chunk(2);
        endpoint.write(&[1, 2, 3, 4, 5]).unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(endpoint.read(&mut buf).unwrap(), 2);
        assert_eq!(endpoint.read(&mut buf[2..]).unwrap(), 2);
        assert_eq!(endpoint.read(&mut buf[4..]).unwrap(), 1);
        assert_eq!(buf, [2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_fault_applies_to_one_call_only() {
        let mut endpoint =
            MockEndpoint::correct().with_fault(Fault::CorruptByte { call: 1, index: 0 });
        let mut buf = [0u8; 1];

        endpoint.write(&[10]).unwrap();
        endpoint.read(&mut buf).unwrap();
        assert_eq!(buf[0], 11);

        endpoint.write(&[10]).unwrap();
        endpoint.read(&mut buf).unwrap();
        assert_ne!(buf[0], 11);

        endpoint.write(&[10]).unwrap();
        endpoint.read(&mut buf).unwrap();
        assert_eq!(buf[0], 11);
    }

    #[test]
    fn test_close_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut endpoint = MockEndpoint::correct().with_close_counter(Arc::clone(&counter));

        endpoint.close();
        endpoint.close();

        assert!(endpoint.is_closed());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(endpoint.write(&[1]).is_err());
    }
}
