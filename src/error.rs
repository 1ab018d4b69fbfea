//! Error kinds raised by the core data structure and the query engine.
//!
//! These are deliberately narrow: everything that is not one of the kinds
//! below is an invariant violation and is left to propagate as an `eyre`
//! report rather than be folded into this enum.

use thiserror::Error;

/// An error raised while building or walking an [`crate::imt::IndexedMerkleTree`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MerkleError {
    /// `build` was called with no leaves.
    #[error("cannot build a merkle tree with no leaves")]
    EmptyTree,

    /// `get_proof`/`leaf` was called with an index outside the tree.
    #[error("leaf index {index} is out of range for a tree with {len} leaves")]
    IndexOutOfRange {
        index: usize,
        len: usize,
    },

    /// The single-chain verifier encountered a side tag other than `L` or `R`
    /// in the middle of a chain.
    #[error("proof chain entry at position {position} has an invalid side tag")]
    InvalidSide {
        position: usize,
    },

    /// The single-chain verifier's recomputed root did not match the chain's
    /// asserted root.
    #[error("recomputed root does not match the asserted root in the proof chain")]
    InvalidChain,

    /// `join` was called on two chains whose pivot digests differ.
    #[error("the two proof chains do not connect at a shared pivot")]
    DisjointChains,

    /// A forest lookup by root digest found no matching tree.
    #[error("no tree in the forest is keyed by root {root}")]
    UnknownRoot {
        root: String,
    },

    /// The requested global index fell outside `[0, top_root.idx]`.
    #[error("requested index {requested} is out of range for top root index {top_root_idx}")]
    RequestedIndexOutOfRange {
        requested: i64,
        top_root_idx: u64,
    },
}

impl MerkleError {
    /// Returns `true` for errors that are expected, client-facing bounds
    /// misses (`{"Failure": 0}` on the wire), as opposed to server faults
    /// that must never occur against a correctly built forest.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            MerkleError::RequestedIndexOutOfRange { .. } | MerkleError::UnknownRoot { .. }
        )
    }
}
