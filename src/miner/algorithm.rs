// src/miner/algorithm.rs
//! DUCO-S1 algorithm implementation
//!
//! The job protocol's proof-of-work is SHA-1 based: a candidate input is
//! the previous block hash, the miner's username and a decimal nonce,
//! concatenated as text, and a nonce solves a unit when the lowercase-hex
//! digest of that input starts with the unit's target prefix.
//!
//! The block hash and username are fixed for a whole unit, so the hasher
//! is seeded with them once and cloned per nonce instead of re-absorbing
//! the common prefix on every attempt.

use crate::types::WorkUnit;
use sha1::{Digest, Sha1};

/// DUCO-S1 hasher bound to one work unit and one username
///
/// Deterministic: the same unit, username and nonce always produce the
/// same digest, which makes worker runs reproducible.
#[derive(Debug, Clone)]
pub struct DucoS1 {
    /// SHA-1 state pre-seeded with `last_block_hash + username`
    base: Sha1,
    /// Lowercase-hex prefix a solving digest must start with
    target: String,
}

impl DucoS1 {
    /// Creates a hasher for `unit` mining under `username`
    pub fn new(unit: &WorkUnit, username: &str) -> Self {
        let mut base = Sha1::new();
        base.update(unit.last_block_hash.as_bytes());
        base.update(username.as_bytes());
        DucoS1 {
            base,
            target: unit.target.clone(),
        }
    }

    /// Computes the candidate digest for `nonce`
    pub fn digest(&self, nonce: u64) -> [u8; 20] {
        let mut hasher = self.base.clone();
        hasher.update(nonce.to_string().as_bytes());
        hasher.finalize().into()
    }

    /// Checks a digest against the unit's target prefix
    ///
    /// An empty target matches everything, the trivially-solvable case.
    pub fn matches(&self, digest: &[u8; 20]) -> bool {
        if self.target.is_empty() {
            return true;
        }
        hex::encode(digest).starts_with(&self.target)
    }

    /// Hashes one nonce and returns its digest when it solves the unit
    pub fn try_nonce(&self, nonce: u64) -> Option<[u8; 20]> {
        let digest = self.digest(nonce);
        if self.matches(&digest) { Some(digest) } else { None }
    }
}
