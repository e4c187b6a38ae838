//! SHA-256 content digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the value is always lowercase hex
/// produced by one of the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        ContentDigest(hex::encode(Sha256::digest(data)))
    }

    /// Digest of an ordered list of parts. Parts are NUL-separated so
    /// `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn from_parts<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_ref());
            hasher.update(b"\0");
        }
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_is_deterministic() {
        let a = ContentDigest::from_bytes(b"report");
        let b = ContentDigest::from_bytes(b"report");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_from_parts_is_boundary_sensitive() {
        let a = ContentDigest::from_parts(["ab", "c"]);
        let b = ContentDigest::from_parts(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_parts_is_order_sensitive() {
        let a = ContentDigest::from_parts(["l1", "l2"]);
        let b = ContentDigest::from_parts(["l2", "l1"]);
        assert_ne!(a, b);
    }
}
