//! Change-detection fingerprints.

use std::fs::Metadata;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Compute the xxh3 64-bit hash of file content.
#[inline]
pub fn hash_content(content: &[u8]) -> u64 {
    xxh3_64(content)
}

/// Cheap change signature for a file.
///
/// Size and modification time are always recorded. The content hash is
/// present when the scan ran in content-hash mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub mtime_ns: u128,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<u64>,
}

impl Fingerprint {
    pub fn from_metadata(meta: &Metadata) -> Self {
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Self {
            size: meta.len(),
            mtime_ns,
            hash: None,
        }
    }

    pub fn with_hash(mut self, content: &[u8]) -> Self {
        self.hash = Some(hash_content(content));
        self
    }

    /// Whether `self` (cached) still describes a file fingerprinted as `current`.
    ///
    /// When both sides carry a content hash the hash decides, so touching a
    /// file without editing it keeps the entry valid. Otherwise size and
    /// mtime must both match.
    pub fn matches(&self, current: &Fingerprint) -> bool {
        if self.size != current.size {
            return false;
        }
        match (self.hash, current.hash) {
            (Some(a), Some(b)) => a == b,
            _ => self.mtime_ns == current.mtime_ns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(size: u64, mtime_ns: u128, hash: Option<u64>) -> Fingerprint {
        Fingerprint {
            size,
            mtime_ns,
            hash,
        }
    }

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash_content(b"hello"), hash_content(b"hello"));
        assert_ne!(hash_content(b"hello"), hash_content(b"world"));
    }

    #[test]
    fn test_hash_wins_over_mtime() {
        assert!(fp(5, 1, Some(7)).matches(&fp(5, 2, Some(7))));
        assert!(!fp(5, 1, Some(7)).matches(&fp(5, 1, Some(8))));
    }

    #[test]
    fn test_metadata_mode() {
        assert!(fp(5, 1, None).matches(&fp(5, 1, None)));
        assert!(!fp(5, 1, None).matches(&fp(5, 2, None)));
        assert!(!fp(5, 1, Some(7)).matches(&fp(6, 1, Some(7))));
        // one side without hash falls back to mtime
        assert!(!fp(5, 1, Some(7)).matches(&fp(5, 2, None)));
    }
}
