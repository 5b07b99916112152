//! Problem fingerprinting.
//!
//! A fingerprint digests everything that can affect which plan is correct
//! and fastest for a problem: the element precision, the feasibility flags,
//! the parallelism degree, and the problem structure itself. Search-effort
//! flags are deliberately excluded; they live in the cache entry instead.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 128-bit problem signature, stored as four 32-bit words.
///
/// Collisions are unlikely but never assumed impossible; the planner's
/// recovery ladder is the backstop for a wrong hit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(pub [u32; 4]);

impl Signature {
    /// Primary probe position for a table of `size` slots.
    pub(crate) fn h1(&self, size: usize) -> usize {
        self.0[0] as usize % size
    }

    /// Probe stride for double hashing; nonzero for any `size > 1`.
    pub(crate) fn h2(&self, size: usize) -> usize {
        1 + self.0[1] as usize % (size - 1)
    }

    pub fn words(&self) -> [u32; 4] {
        self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}{:08x}{:08x}{:08x}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Incremental signature builder.
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    pub fn new() -> Fingerprinter {
        Fingerprinter {
            hasher: Sha256::new(),
        }
    }

    /// Mix in a domain-separation tag so different record kinds with the
    /// same numeric payload cannot collide.
    pub fn add_tag(&mut self, tag: &str) {
        self.hasher.update([tag.len() as u8]);
        self.hasher.update(tag.as_bytes());
    }

    pub fn add_u32(&mut self, v: u32) {
        self.hasher.update(v.to_le_bytes());
    }

    pub fn add_u64(&mut self, v: u64) {
        self.hasher.update(v.to_le_bytes());
    }

    pub fn add_usize(&mut self, v: usize) {
        self.add_u64(v as u64);
    }

    pub fn add_isize(&mut self, v: isize) {
        self.add_u64(v as i64 as u64);
    }

    pub fn finish(self) -> Signature {
        let digest = self.hasher.finalize();
        let mut words = [0u32; 4];
        for (i, w) in words.iter_mut().enumerate() {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&digest[i * 4..i * 4 + 4]);
            *w = u32::from_le_bytes(bytes);
        }
        Signature(words)
    }
}

impl Default for Fingerprinter {
    fn default() -> Fingerprinter {
        Fingerprinter::new()
    }
}
