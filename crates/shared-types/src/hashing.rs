//! # Hash Service
//!
//! Content addressing used by both the tracker and its peers. The service
//! validates hash strings received over the wire, normalizes them into map
//! keys and computes digests of fragment payloads.

use sha2::{Digest, Sha256};

/// Validation, normalization and digest computation for content hashes.
pub trait HashService: Send + Sync {
    /// Name advertised in join requests, compared case-insensitively.
    fn algorithm_name(&self) -> &str;

    /// Whether `hash` is a well-formed digest string for this algorithm.
    fn validate(&self, hash: &str) -> bool;

    /// Canonical form of a valid hash.
    fn normalize(&self, hash: &str) -> String;

    /// Normalized digest of `data`.
    fn compute_digest(&self, data: &[u8]) -> String;

    /// Validate and normalize in one step.
    fn try_normalize(&self, hash: &str) -> Option<String> {
        self.validate(hash).then(|| self.normalize(hash))
    }
}

/// SHA-256 with uppercase hexadecimal digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256HashService;

impl Sha256HashService {
    pub const ALGORITHM_NAME: &'static str = "SHA256";

    /// Hex length of a SHA-256 digest.
    pub const DIGEST_HEX_LEN: usize = 64;

    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HashService for Sha256HashService {
    fn algorithm_name(&self) -> &str {
        Self::ALGORITHM_NAME
    }

    fn validate(&self, hash: &str) -> bool {
        hash.len() == Self::DIGEST_HEX_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())
    }

    fn normalize(&self, hash: &str) -> String {
        hash.to_ascii_uppercase()
    }

    fn compute_digest(&self, data: &[u8]) -> String {
        hex::encode_upper(Sha256::digest(data))
    }
}
