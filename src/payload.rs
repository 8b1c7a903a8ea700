//! Test payload generation and the DUT transform rule.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Byte the DUT must return for `sent`: increment, wrapping at 256.
#[inline]
pub fn expected_reply(sent: u8) -> u8 {
    sent.wrapping_add(1)
}

/// Immutable block of bytes sent to the DUT in one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    /// Deterministic payload `0, 1, 2, ..` wrapping at 256.
    pub fn sequential(len: usize) -> Self {
        // Truncation is the wrap we want
        #[allow(clippy::cast_possible_truncation)]
        let bytes = (0..len).map(|i| i as u8).collect();
        Self { bytes }
    }

    /// Pseudo-random payload seeded from the OS.
    pub fn random(len: usize) -> Self {
        Self::random_from(&mut StdRng::from_os_rng(), len)
    }

    /// Reproducible pseudo-random payload.
    pub fn seeded(len: usize, seed: u64) -> Self {
        Self::random_from(&mut StdRng::seed_from_u64(seed), len)
    }

    fn random_from(rng: &mut StdRng, len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rng.fill(&mut bytes[..]);
        Self { bytes }
    }

    /// The bytes to transmit.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_reply_wraps() {
        assert_eq!(expected_reply(0), 1);
        assert_eq!(expected_reply(254), 255);
        assert_eq!(expected_reply(255), 0);
    }

    #[test]
    fn test_sequential_wraps_at_256() {
        let payload = Payload::sequential(300);
        assert_eq!(payload.len(), 300);
        assert_eq!(payload.as_bytes()[0], 0);
        assert_eq!(payload.as_bytes()[255], 255);
        assert_eq!(payload.as_bytes()[256], 0);
        assert_eq!(payload.as_bytes()[299], 43);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = Payload::seeded(2048, 42);
        let b = Payload::seeded(2048, 42);
        let c = Payload::seeded(2048, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_random_length() {
        assert_eq!(Payload::random(2048).len(), 2048);
        assert!(Payload::random(0).is_empty());
    }
}
