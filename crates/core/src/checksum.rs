//! MD5 checksum types and utilities.
//!
//! Clients send an MD5 digest per chunk and for the whole file; both are
//! exchanged as lowercase hex. MD5 is an integrity check here, not a
//! security boundary.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An MD5 checksum represented as 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum([u8; 16]);

impl Checksum {
    /// Create a new Checksum from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Compute the MD5 checksum of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher.
    pub fn hasher() -> ChecksumHasher {
        ChecksumHasher(Md5::new())
    }

    /// Parse from a lowercase hex string (32 characters).
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 32 {
            return Err(crate::Error::InvalidChecksum(format!(
                "expected 32 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidChecksum(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidChecksum(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Verify that data hashes to this checksum.
    pub fn verify(&self, data: &[u8]) -> crate::Result<()> {
        let actual = Self::compute(data);
        if &actual != self {
            return Err(crate::Error::ChecksumMismatch {
                expected: self.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental MD5 hasher for streaming assembly.
pub struct ChecksumHasher(Md5);

impl ChecksumHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the checksum.
    pub fn finalize(self) -> Checksum {
        Checksum(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_vector() {
        // md5("hello world")
        let checksum = Checksum::compute(b"hello world");
        assert_eq!(checksum.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_checksum_hex_roundtrip() {
        let checksum = Checksum::compute(b"roundtrip");
        let hex = checksum.to_hex();
        let parsed = Checksum::from_hex(&hex).unwrap();
        assert_eq!(checksum, parsed);

        assert!(Checksum::from_hex("too-short").is_err());
        assert!(Checksum::from_hex(&"g".repeat(32)).is_err());
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let data = b"some bytes fed in pieces";
        let mut hasher = Checksum::hasher();
        hasher.update(&data[..7]);
        hasher.update(&data[7..]);
        assert_eq!(hasher.finalize(), Checksum::compute(data));
    }

    #[test]
    fn test_verify() {
        let checksum = Checksum::compute(b"payload");
        checksum.verify(b"payload").unwrap();
        assert!(checksum.verify(b"tampered").is_err());
    }
}
