//! Linear proof chains and their verification.
//!
//! A [`ProofChain`] is the flattened path from one leaf to the root of a
//! single [`crate::imt::IndexedMerkleTree`]: a `SELF` entry, zero or more
//! sibling entries tagged by which side they sit on, and a `ROOT` entry.
//! Verifying a chain replays the sibling hashes bottom-up and checks that the
//! recomputed digest matches the asserted root — the `idx` values travel
//! alongside every entry for the caller's inspection but never enter the
//! hash.

use crate::{
    error::MerkleError,
    hash::{
        combine,
        hash_one,
        Digest,
    },
};

/// Which side of its parent a chain entry's node sits on, or whether the
/// entry is the leaf under proof (`SelfLink`) or the tree's root (`Root`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideTag {
    SelfLink,
    Left,
    Right,
    Root,
}

impl SideTag {
    /// The wire tag used in the JSON encoding (`"SELF"`, `"L"`, `"R"`, `"ROOT"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SideTag::SelfLink => "SELF",
            SideTag::Left => "L",
            SideTag::Right => "R",
            SideTag::Root => "ROOT",
        }
    }
}

/// One entry of a [`ProofChain`]: a node's digest and subtree-max index,
/// tagged with its position/side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub digest: Digest,
    pub idx: u64,
    pub tag: SideTag,
}

/// The ordered path from a leaf to a tree's root, as returned by
/// [`crate::imt::IndexedMerkleTree::get_proof`].
///
/// Always has at least two entries: a `SELF` entry and a `ROOT` entry. A
/// single-leaf tree's proof is exactly those two entries with no sibling
/// hops in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofChain(Vec<ChainLink>);

impl ProofChain {
    /// Builds a chain from its entries.
    ///
    /// # Panics
    /// Panics if `links` has fewer than two entries, or if the first entry
    /// is not tagged `SelfLink`, or the last is not tagged `Root`. These are
    /// invariants of every chain this crate constructs; this constructor is
    /// only reached from [`crate::imt::IndexedMerkleTree::get_proof`].
    #[must_use]
    pub(crate) fn new(links: Vec<ChainLink>) -> Self {
        assert!(links.len() >= 2, "a proof chain has at least SELF and ROOT");
        assert!(matches!(links.first().unwrap().tag, SideTag::SelfLink));
        assert!(matches!(links.last().unwrap().tag, SideTag::Root));
        Self(links)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ChainLink] {
        &self.0
    }

    #[must_use]
    pub fn self_link(&self) -> ChainLink {
        self.0[0]
    }

    #[must_use]
    pub fn root_link(&self) -> ChainLink {
        *self.0.last().expect("chain is never empty")
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Replays the sibling hashes of `chain` bottom-up and checks that the
/// recomputed digest matches the chain's asserted root.
///
/// Returns the recomputed `(digest, idx)` pair on success, which for a valid
/// chain equals [`ProofChain::root_link`]'s `(digest, idx)`.
///
/// # Errors
/// Returns [`MerkleError::InvalidSide`] if a middle entry is tagged neither
/// `L` nor `R`, or [`MerkleError::InvalidChain`] if the recomputed root does
/// not match the chain's final entry.
pub fn verify_chain(chain: &ProofChain) -> Result<(Digest, u64), MerkleError> {
    let links = chain.as_slice();
    let mut link = links[0].digest;
    for (position, entry) in links[1..links.len() - 1].iter().enumerate() {
        link = match entry.tag {
            SideTag::Right => combine(&link, &entry.digest),
            SideTag::Left => combine(&entry.digest, &link),
            SideTag::SelfLink | SideTag::Root => {
                return Err(MerkleError::InvalidSide {
                    position: position + 1,
                });
            }
        };
    }
    let root = links.last().expect("chain is never empty");
    if link == root.digest {
        Ok((link, root.idx))
    } else {
        Err(MerkleError::InvalidChain)
    }
}

/// Joins two chains at a shared pivot: `low`'s root digest must equal
/// `high`'s leaf (`SELF`) digest.
///
/// # Errors
/// Returns [`MerkleError::DisjointChains`] if the pivot digests differ.
pub fn join(low: &ProofChain, high: &ProofChain) -> Result<ProofChain, MerkleError> {
    let low_root = low.root_link();
    let high_self = high.self_link();
    if low_root.digest != high_self.digest {
        return Err(MerkleError::DisjointChains);
    }
    let mut links = low.as_slice()[..low.len() - 1].to_vec();
    links.extend_from_slice(&high.as_slice()[1..]);
    Ok(ProofChain::new(links))
}

/// The three-chain proof returned for a single queried output: proof within
/// its transaction, proof of that transaction's root within its block, and
/// proof of that block's root within the top tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchicalProof {
    pub out_proof: ProofChain,
    pub tx_proof: ProofChain,
    pub blk_proof: ProofChain,
}

/// Verifies a claimed output against a known top root, per the hierarchical
/// verification procedure: the `SELF` entry of each level's chain must equal
/// the rehash of the previous level's recomputed root, and the final
/// recomputed `(digest, idx)` must equal `top_root`.
///
/// This is a client-side routine: the server never calls it over HTTP
/// (authenticating clients is out of scope), but it is exercised directly by
/// this crate's test suite against server-produced proofs.
///
/// # Errors
/// Returns an error from [`verify_chain`] if any level's chain does not
/// verify, or [`MerkleError::InvalidChain`] if a level boundary's rehash
/// does not match the next level's `SELF` entry, or if the final root does
/// not match `top_root`.
pub fn verify_hierarchical(
    outkey: &[u8],
    idx_out: u64,
    proof: &HierarchicalProof,
    top_root: (Digest, u64),
) -> Result<(), MerkleError> {
    let expected_self = hash_one(outkey);
    let self_link = proof.out_proof.self_link();
    if self_link.digest != expected_self || self_link.idx != idx_out {
        return Err(MerkleError::InvalidChain);
    }
    let (r1, i1) = verify_chain(&proof.out_proof)?;

    let expected_tx_self = hash_one(&r1);
    let tx_self = proof.tx_proof.self_link();
    if tx_self.digest != expected_tx_self || tx_self.idx != i1 {
        return Err(MerkleError::InvalidChain);
    }
    let (r2, i2) = verify_chain(&proof.tx_proof)?;

    let expected_blk_self = hash_one(&r2);
    let blk_self = proof.blk_proof.self_link();
    if blk_self.digest != expected_blk_self || blk_self.idx != i2 {
        return Err(MerkleError::InvalidChain);
    }
    let (r3, i3) = verify_chain(&proof.blk_proof)?;

    if (r3, i3) == top_root {
        Ok(())
    } else {
        Err(MerkleError::InvalidChain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imt::{
        IndexedMerkleTree,
        LeafInput,
    };

    fn leaves(payloads: &[(&str, u64)]) -> Vec<LeafInput> {
        payloads
            .iter()
            .map(|(p, idx)| LeafInput {
                payload: p.as_bytes().to_vec(),
                idx: *idx,
            })
            .collect()
    }

    #[test]
    fn single_leaf_chain_verifies() {
        let tree = IndexedMerkleTree::build(leaves(&[("a", 0)])).expect("builds");
        let proof = tree.get_proof(0).expect("leaf 0 exists");
        assert_eq!(proof.len(), 2);
        let (root, idx) = verify_chain(&proof).expect("valid chain verifies");
        assert_eq!(root, tree.root_digest());
        assert_eq!(idx, 0);
    }

    #[test]
    fn tampered_chain_is_rejected() {
        let tree = IndexedMerkleTree::build(leaves(&[("a", 0), ("b", 1), ("c", 2)])).expect("builds");
        let mut proof = tree.get_proof(0).expect("leaf 0 exists").as_slice().to_vec();
        proof[1].digest[0] ^= 0xFF;
        let tampered = ProofChain::new(proof);
        assert!(matches!(
            verify_chain(&tampered),
            Err(MerkleError::InvalidChain)
        ));
    }

    #[test]
    fn join_requires_matching_pivot() {
        let low = IndexedMerkleTree::build(leaves(&[("a", 0), ("b", 1)])).expect("builds");
        let low_proof = low.get_proof(0).expect("leaf 0 exists");

        let unrelated = IndexedMerkleTree::build(leaves(&[("x", 0), ("y", 1)])).expect("builds");
        let unrelated_proof = unrelated.get_proof(0).expect("leaf 0 exists");

        assert!(matches!(
            join(&low_proof, &unrelated_proof),
            Err(MerkleError::DisjointChains)
        ));
    }
}
