//! The single hashing primitive shared by every level of the forest.
//!
//! There is deliberately no domain separation between leaf hashes and internal
//! node hashes: an output-level leaf hashes its raw output key, and every
//! internal node hashes the concatenation of its two children's digests. A
//! proof verifier and a tree builder must therefore agree byte-for-byte on
//! this function or proofs silently stop verifying.

use sha2::{
    Digest as _,
    Sha256,
};

/// Number of bytes in a digest produced by this module.
pub const DIGEST_LEN: usize = 32;

/// A fixed-size SHA-256 digest.
pub type Digest = [u8; DIGEST_LEN];

/// Hashes a single byte string.
///
/// Used both for non-prehashed leaves (`SHA256(payload)`) and for the
/// inter-level rehash described in the hierarchical verification procedure
/// (`SHA256(lower_level_root)`).
#[must_use]
pub fn hash_one(data: &[u8]) -> Digest {
    Sha256::digest(data).into()
}

/// Hashes the concatenation of two digests, as used to combine a pair of
/// children into their parent's `val`.
#[must_use]
pub fn combine(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}
