//! The three-level Merkle forest: outputs within a transaction, transactions
//! within a block, blocks within the chain.
//!
//! A [`MerkleForest`] is a collection of independent
//! [`crate::imt::IndexedMerkleTree`]s, keyed by the hex encoding of their own
//! root digest, plus a distinguished top tree whose leaves are block roots.
//! Grouping raw [`OutputRecord`]s into the three levels, and keeping the
//! forest's keys in sync as the top tree grows, are this module's job; a
//! single query across all three levels is [`MerkleForest::query`].

use std::collections::HashMap;

use crate::{
    error::MerkleError,
    hash::Digest,
    imt::{
        ChildrenView,
        IndexedMerkleTree,
        LeafInput,
        Step,
    },
    proof::HierarchicalProof,
};

/// One output as it comes out of the loader: which block and transaction it
/// belongs to, its raw output key, and its global index.
#[derive(Debug, Clone)]
pub struct OutputRecord {
    pub block_hash: String,
    pub tx_hash: String,
    pub outkey: Vec<u8>,
    pub idx: u64,
}

/// An output found by [`MerkleForest::query`]: its raw key and global index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFound {
    pub outkey: Vec<u8>,
    pub idx: u64,
}

/// Splits `items` into maximal runs of consecutive elements sharing the same
/// `key`, preserving order. Mirrors the grouping `monero_server.py` does by
/// scanning a flat row stream and starting a new group whenever the grouping
/// column changes.
fn partition_contiguous<T, K: PartialEq>(items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<Vec<T>> {
    let mut groups: Vec<Vec<T>> = Vec::new();
    for item in items {
        let starts_new_group = match groups.last() {
            Some(group) => key(group.last().expect("group is never empty")) != key(&item),
            None => true,
        };
        if starts_new_group {
            groups.push(Vec::new());
        }
        groups.last_mut().expect("just pushed").push(item);
    }
    groups
}

/// A collection of indexed Merkle trees at all three levels, keyed by the
/// hex encoding of each tree's own root digest.
pub struct MerkleForest {
    trees: HashMap<String, IndexedMerkleTree>,
    top_root: (Digest, u64),
}

impl MerkleForest {
    /// Builds a forest from a flat stream of output records, ordered by
    /// ascending global index and pre-sorted so that every record belonging
    /// to the same transaction is contiguous, and every transaction
    /// belonging to the same block is contiguous.
    ///
    /// # Errors
    /// Returns [`MerkleError::EmptyTree`] if `records` is empty, or if it
    /// somehow groups into a block or transaction with no outputs.
    pub fn build(records: Vec<OutputRecord>) -> Result<Self, MerkleError> {
        if records.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        let mut trees = HashMap::new();
        let mut top_leaves = Vec::new();
        for block in partition_contiguous(records, |r| r.block_hash.clone()) {
            let (digest, idx) = build_block(&mut trees, block)?;
            top_leaves.push(LeafInput {
                payload: digest.to_vec(),
                idx,
            });
        }
        let top_tree = IndexedMerkleTree::build(top_leaves)?;
        let top_root = (top_tree.root_digest(), top_tree.root_idx());
        trees.insert(hex::encode(top_root.0), top_tree);
        Ok(Self { trees, top_root })
    }

    /// Appends one new block's worth of output records to the forest,
    /// growing the top tree via append-adjust instead of a full rebuild.
    ///
    /// The superseded top-root forest entry is removed and the new one
    /// inserted as a single step; callers that share a `MerkleForest` across
    /// threads must hold an exclusive lock across this call so that readers
    /// never observe a forest with neither entry present.
    ///
    /// # Errors
    /// Returns [`MerkleError::EmptyTree`] if `block` is empty, or if it
    /// groups into a transaction with no outputs.
    pub fn append_block(&mut self, block: Vec<OutputRecord>) -> Result<(Digest, u64), MerkleError> {
        if block.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        let (block_digest, block_idx) = build_block(&mut self.trees, block)?;

        let old_key = hex::encode(self.top_root.0);
        let mut top_tree = self
            .trees
            .remove(&old_key)
            .expect("top root is always present in the forest");
        top_tree.append_adjust(LeafInput {
            payload: block_digest.to_vec(),
            idx: block_idx,
        });
        let new_root = (top_tree.root_digest(), top_tree.root_idx());
        self.trees.insert(hex::encode(new_root.0), top_tree);
        self.top_root = new_root;
        Ok(new_root)
    }

    /// The current top root's digest and subtree-max index.
    #[must_use]
    pub fn top_root(&self) -> (Digest, u64) {
        self.top_root
    }

    /// The number of leaves of the tree keyed by `root_hex`.
    ///
    /// # Errors
    /// Returns [`MerkleError::UnknownRoot`] if no tree in the forest has
    /// that root.
    pub fn num_leaves(&self, root_hex: &str) -> Result<usize, MerkleError> {
        Ok(self.tree(root_hex)?.num_leaves())
    }

    /// The children reported for `path` under the tree keyed by `root_hex`.
    ///
    /// # Errors
    /// Returns [`MerkleError::UnknownRoot`] if no tree in the forest has
    /// that root.
    pub fn children_at(&self, root_hex: &str, path: &[Step]) -> Result<ChildrenView, MerkleError> {
        Ok(self.tree(root_hex)?.children_at(path))
    }

    fn tree(&self, root_hex: &str) -> Result<&IndexedMerkleTree, MerkleError> {
        self.trees.get(root_hex).ok_or_else(|| MerkleError::UnknownRoot {
            root: root_hex.to_string(),
        })
    }

    /// Finds the qualifying output for global index `requested` — the
    /// leftmost output whose index is `>= requested` — and the hierarchical
    /// proof chaining it up to the current top root.
    ///
    /// # Errors
    /// Returns [`MerkleError::RequestedIndexOutOfRange`] if `requested` is
    /// negative or exceeds the top root's index.
    pub fn query(&self, requested: i64) -> Result<(OutputFound, HierarchicalProof), MerkleError> {
        if requested < 0 || requested as u64 > self.top_root.1 {
            return Err(MerkleError::RequestedIndexOutOfRange {
                requested,
                top_root_idx: self.top_root.1,
            });
        }
        let q = requested as u64;

        let top_tree = self.tree(&hex::encode(self.top_root.0))?;
        let (blk_pos, _, _) = top_tree
            .find_successor(q)
            .expect("query is bounded by the top root's own index");
        let blk_proof = top_tree.get_proof(blk_pos)?;
        let blk_key = top_tree
            .leaf_payload(blk_pos)
            .expect("the successor leaf carries its raw, un-hashed root digest as payload");

        let block_tree = self.tree(&hex::encode(blk_key))?;
        let (tx_pos, _, _) = block_tree
            .find_successor(q)
            .expect("the qualifying block contains a qualifying transaction");
        let tx_proof = block_tree.get_proof(tx_pos)?;
        let tx_key = block_tree
            .leaf_payload(tx_pos)
            .expect("the successor leaf carries its raw, un-hashed root digest as payload");

        let tx_tree = self.tree(&hex::encode(tx_key))?;
        let (out_pos, _, out_idx) = tx_tree
            .find_successor(q)
            .expect("the qualifying transaction contains a qualifying output");
        let out_proof = tx_tree.get_proof(out_pos)?;
        let outkey = tx_tree
            .leaf_payload(out_pos)
            .expect("queried leaf carries its original payload")
            .to_vec();

        Ok((
            OutputFound {
                outkey,
                idx: out_idx,
            },
            HierarchicalProof {
                out_proof,
                tx_proof,
                blk_proof,
            },
        ))
    }
}

/// Builds the transaction-level trees for one block's records, then the
/// block-level tree over their roots, registering every tree built along
/// the way. Returns the block tree's `(root_digest, root_idx)`.
fn build_block(
    trees: &mut HashMap<String, IndexedMerkleTree>,
    block: Vec<OutputRecord>,
) -> Result<(Digest, u64), MerkleError> {
    let mut block_leaves = Vec::new();
    for tx in partition_contiguous(block, |r| r.tx_hash.clone()) {
        let leaves = tx
            .into_iter()
            .map(|r| LeafInput {
                payload: r.outkey,
                idx: r.idx,
            })
            .collect();
        let tx_tree = IndexedMerkleTree::build(leaves)?;
        let (digest, idx) = (tx_tree.root_digest(), tx_tree.root_idx());
        trees.insert(hex::encode(digest), tx_tree);
        block_leaves.push(LeafInput {
            payload: digest.to_vec(),
            idx,
        });
    }
    let block_tree = IndexedMerkleTree::build(block_leaves)?;
    let root = (block_tree.root_digest(), block_tree.root_idx());
    trees.insert(hex::encode(root.0), block_tree);
    Ok(root)
}
