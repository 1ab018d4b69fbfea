//! The Indexed Merkle Tree: a binary Merkle tree whose internal nodes carry
//! both a SHA-256 digest and the maximum leaf index in their subtree.
//!
//! All nodes belonging to one tree live in a single arena (`Vec<Node>`);
//! parent, children and sibling links are arena indices rather than
//! pointers, so a tree has no ownership cycles and can be dropped as a unit.
//!
//! # Examples
//! ```
//! use rct_merkle_forest::imt::{IndexedMerkleTree, LeafInput};
//!
//! let leaves = vec![
//!     LeafInput { payload: b"a".to_vec(), idx: 0 },
//!     LeafInput { payload: b"b".to_vec(), idx: 1 },
//!     LeafInput { payload: b"c".to_vec(), idx: 2 },
//! ];
//! let tree = IndexedMerkleTree::build(leaves).expect("non-empty");
//! let proof = tree.get_proof(2).expect("leaf 2 is in the tree");
//! assert_eq!(proof.len(), 2 + 1); // SELF, one pairing, ROOT: c was promoted unpaired once
//! ```

use crate::{
    error::MerkleError,
    hash::{
        combine,
        hash_one,
        Digest,
    },
    proof::{
        ChainLink,
        ProofChain,
        SideTag,
    },
};

type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl From<Side> for SideTag {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => SideTag::Left,
            Side::Right => SideTag::Right,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    val: Digest,
    idx: u64,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    sibling: Option<NodeId>,
    side: Option<Side>,
    /// Original, un-hashed payload bytes. `Some` only for leaf nodes.
    data: Option<Vec<u8>>,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.data.is_some()
    }
}

/// One input leaf: an opaque payload plus its global index. The leaf's
/// digest is always `SHA256(payload)`; `payload` is retained verbatim as the
/// leaf's `data` for later `/getchildren` lookups.
#[derive(Debug, Clone)]
pub struct LeafInput {
    pub payload: Vec<u8>,
    pub idx: u64,
}

/// An arena-backed indexed Merkle tree.
///
/// Construct with [`IndexedMerkleTree::build`]; grow in place with
/// [`IndexedMerkleTree::append_adjust`]; extract proofs with
/// [`IndexedMerkleTree::get_proof`].
#[derive(Debug, Clone)]
pub struct IndexedMerkleTree {
    arena: Vec<Node>,
    leaves: Vec<NodeId>,
    root: NodeId,
}

impl IndexedMerkleTree {
    /// Builds a tree from an ordered sequence of leaves.
    ///
    /// # Errors
    /// Returns [`MerkleError::EmptyTree`] if `leaves` is empty.
    pub fn build(leaves: Vec<LeafInput>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyTree);
        }
        let mut arena = Vec::with_capacity(leaves.len() * 2);
        let mut level = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let id = push_leaf(&mut arena, leaf);
            level.push(id);
        }
        let leaf_ids = level.clone();

        while level.len() != 1 {
            level = aggregate_level(&mut arena, level);
        }

        Ok(Self {
            arena,
            leaves: leaf_ids,
            root: level[0],
        })
    }

    /// Adds one leaf without rebuilding, producing the same root as a full
    /// rebuild of `leaves ∥ [new_leaf]` would.
    pub fn append_adjust(&mut self, leaf: LeafInput) {
        let n = self.leaves.len();
        let new_id = push_leaf(&mut self.arena, leaf);
        self.leaves.push(new_id);

        let mut subtrees = Vec::new();
        let mut loose_leaves = n - largest_power_of_two_leq(n);
        let mut current = self.root;
        while loose_leaves > 0 {
            let left = self.arena[current]
                .left
                .expect("a non-singleton complete tree's spine node has a left child");
            subtrees.push(left);
            current = self.arena[current]
                .right
                .expect("a non-singleton complete tree's spine node has a right child");
            loose_leaves -= largest_power_of_two_leq(loose_leaves);
        }
        subtrees.push(current);

        let mut x = new_id;
        for &s in subtrees.iter().rev() {
            x = pair(&mut self.arena, s, x);
        }
        self.root = x;
    }

    /// Extracts the proof chain from leaf `leaf_index` to the root.
    ///
    /// # Errors
    /// Returns [`MerkleError::IndexOutOfRange`] if `leaf_index` is outside
    /// the tree.
    pub fn get_proof(&self, leaf_index: usize) -> Result<ProofChain, MerkleError> {
        let leaf_id =
            *self
                .leaves
                .get(leaf_index)
                .ok_or(MerkleError::IndexOutOfRange {
                    index: leaf_index,
                    len: self.leaves.len(),
                })?;

        let mut links = vec![ChainLink {
            digest: self.arena[leaf_id].val,
            idx: self.arena[leaf_id].idx,
            tag: SideTag::SelfLink,
        }];

        let mut current = leaf_id;
        while let Some(parent) = self.arena[current].parent {
            let sibling = self.arena[current]
                .sibling
                .expect("a node with a parent has a sibling");
            let side = self.arena[sibling]
                .side
                .expect("a paired sibling has a side");
            links.push(ChainLink {
                digest: self.arena[sibling].val,
                idx: self.arena[sibling].idx,
                tag: side.into(),
            });
            current = parent;
        }

        links.push(ChainLink {
            digest: self.arena[current].val,
            idx: self.arena[current].idx,
            tag: SideTag::Root,
        });

        Ok(ProofChain::new(links))
    }

    /// Returns the leaf's digest and index, or `None` if `leaf_index` is out
    /// of range.
    #[must_use]
    pub fn leaf(&self, leaf_index: usize) -> Option<(Digest, u64)> {
        let id = *self.leaves.get(leaf_index)?;
        Some((self.arena[id].val, self.arena[id].idx))
    }

    /// Returns the leaf's original, un-hashed payload bytes.
    #[must_use]
    pub fn leaf_payload(&self, leaf_index: usize) -> Option<&[u8]> {
        let id = *self.leaves.get(leaf_index)?;
        self.arena[id].data.as_deref()
    }

    /// Finds the leftmost leaf whose index is `>= query`, by binary search
    /// over the (monotonically increasing) leaf index sequence.
    ///
    /// Returns the leaf's position and `(digest, idx)`.
    #[must_use]
    pub fn find_successor(&self, query: u64) -> Option<(usize, Digest, u64)> {
        let position = self
            .leaves
            .partition_point(|&id| self.arena[id].idx < query);
        let id = *self.leaves.get(position)?;
        Some((position, self.arena[id].val, self.arena[id].idx))
    }

    #[must_use]
    pub fn root_digest(&self) -> Digest {
        self.arena[self.root].val
    }

    #[must_use]
    pub fn root_idx(&self) -> u64 {
        self.arena[self.root].idx
    }

    #[must_use]
    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }

    /// Walks the tree from `root` (or the tree's own root, if `None`)
    /// following `path` (`'l'`/`'r'` per step), then reports the hash and
    /// leaf data (if any) of the two children of the node the walk stopped
    /// at. A single-leaf tree reports both children as the leaf itself.
    ///
    /// Walking stops early if a step in `path` would descend past a leaf.
    #[must_use]
    pub fn children_at(&self, path: &[Step]) -> ChildrenView {
        if self.leaves.len() == 1 {
            let only = self.arena[self.leaves[0]].clone();
            return ChildrenView {
                left: Some((only.val, only.data.clone())),
                right: Some((only.val, only.data.clone())),
            };
        }

        let mut current = self.root;
        for step in path {
            let next = match step {
                Step::Left => self.arena[current].left,
                Step::Right => self.arena[current].right,
            };
            match next {
                Some(id) if !self.arena[current].is_leaf() => current = id,
                _ => break,
            }
        }

        let describe = |id: Option<NodeId>| {
            id.map(|id| {
                let node = &self.arena[id];
                (node.val, node.data.clone())
            })
        };
        ChildrenView {
            left: describe(self.arena[current].left),
            right: describe(self.arena[current].right),
        }
    }
}

/// A single step in a `/getchildren` walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Left,
    Right,
}

/// The result of [`IndexedMerkleTree::children_at`]: each side's digest and,
/// if the side is itself a leaf, its original payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildrenView {
    pub left: Option<(Digest, Option<Vec<u8>>)>,
    pub right: Option<(Digest, Option<Vec<u8>>)>,
}

fn push_leaf(arena: &mut Vec<Node>, leaf: LeafInput) -> NodeId {
    let val = hash_one(&leaf.payload);
    arena.push(Node {
        val,
        idx: leaf.idx,
        parent: None,
        left: None,
        right: None,
        sibling: None,
        side: None,
        data: Some(leaf.payload),
    });
    arena.len() - 1
}

/// Pairs `a` and `b` under a new parent, setting all four back-links.
fn pair(arena: &mut Vec<Node>, a: NodeId, b: NodeId) -> NodeId {
    let parent_val = combine(&arena[a].val, &arena[b].val);
    let parent_idx = arena[a].idx.max(arena[b].idx);
    let parent_id = arena.len();
    arena.push(Node {
        val: parent_val,
        idx: parent_idx,
        parent: None,
        left: Some(a),
        right: Some(b),
        sibling: None,
        side: None,
        data: None,
    });
    arena[a].side = Some(Side::Left);
    arena[b].side = Some(Side::Right);
    arena[a].sibling = Some(b);
    arena[b].sibling = Some(a);
    arena[a].parent = Some(parent_id);
    arena[b].parent = Some(parent_id);
    parent_id
}

/// Reduces one level to the next: pairs adjacent nodes left-to-right,
/// promoting an odd trailing node unchanged (§4.2 invariant 3).
fn aggregate_level(arena: &mut Vec<Node>, mut level: Vec<NodeId>) -> Vec<NodeId> {
    let odd = if level.len() % 2 == 1 {
        level.pop()
    } else {
        None
    };
    let mut next = Vec::with_capacity(level.len() / 2 + 1);
    let mut i = 0;
    while i < level.len() {
        next.push(pair(arena, level[i], level[i + 1]));
        i += 2;
    }
    if let Some(o) = odd {
        next.push(o);
    }
    next
}

fn largest_power_of_two_leq(n: usize) -> usize {
    debug_assert!(n > 0);
    1usize << (usize::BITS - 1 - n.leading_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::verify_chain;

    fn input(payload: &str, idx: u64) -> LeafInput {
        LeafInput {
            payload: payload.as_bytes().to_vec(),
            idx,
        }
    }

    #[test]
    fn build_fails_on_empty_leaves() {
        assert!(matches!(
            IndexedMerkleTree::build(Vec::new()),
            Err(MerkleError::EmptyTree)
        ));
    }

    #[test]
    fn single_leaf_tree_matches_scenario_1() {
        let tree = IndexedMerkleTree::build(vec![input("a", 0)]).expect("builds");
        assert_eq!(tree.root_digest(), hash_one(b"a"));
        assert_eq!(tree.root_idx(), 0);
        let proof = tree.get_proof(0).expect("leaf 0 exists");
        assert_eq!(proof.len(), 2);
    }

    #[test]
    fn two_leaf_tree_matches_scenario_2() {
        let tree = IndexedMerkleTree::build(vec![input("a", 0), input("b", 1)]).expect("builds");
        let expected_root = combine(&hash_one(b"a"), &hash_one(b"b"));
        assert_eq!(tree.root_digest(), expected_root);
        assert_eq!(tree.root_idx(), 1);

        let proof0 = tree.get_proof(0).expect("leaf 0 exists");
        assert_eq!(proof0.as_slice()[1].tag.as_str(), "R");
        let proof1 = tree.get_proof(1).expect("leaf 1 exists");
        assert_eq!(proof1.as_slice()[1].tag.as_str(), "L");

        verify_chain(&proof0).expect("verifies");
        verify_chain(&proof1).expect("verifies");
    }

    #[test]
    fn three_leaf_odd_promotion_matches_scenario_3() {
        let tree = IndexedMerkleTree::build(vec![input("a", 0), input("b", 1), input("c", 2)])
            .expect("builds");
        let level1 = combine(&hash_one(b"a"), &hash_one(b"b"));
        let expected_root = combine(&level1, &hash_one(b"c"));
        assert_eq!(tree.root_digest(), expected_root);
        assert_eq!(tree.root_idx(), 2);

        let proof = tree.get_proof(2).expect("leaf 2 exists");
        // SELF, one sibling entry (the level-1 pair root), ROOT.
        assert_eq!(proof.len(), 3);
        verify_chain(&proof).expect("verifies");
    }

    #[test]
    fn append_adjust_matches_full_rebuild() {
        let full = IndexedMerkleTree::build((0..5).map(|i| input(&i.to_string(), i)).collect())
            .expect("builds");

        let mut incremental =
            IndexedMerkleTree::build((0..4).map(|i| input(&i.to_string(), i)).collect())
                .expect("builds");
        incremental.append_adjust(input("4", 4));

        assert_eq!(full.root_digest(), incremental.root_digest());
        assert_eq!(full.root_idx(), incremental.root_idx());
        assert_eq!(full.root_idx(), 4);
    }

    #[test]
    fn every_leaf_proof_verifies_for_random_sized_trees() {
        for n in 1..20 {
            let tree = IndexedMerkleTree::build(
                (0..n).map(|i| input(&format!("leaf-{i}"), i as u64)).collect(),
            )
            .expect("builds");
            for i in 0..n {
                let proof = tree.get_proof(i).expect("leaf exists");
                let (root, idx) = verify_chain(&proof).expect("verifies");
                assert_eq!(root, tree.root_digest());
                assert_eq!(idx, tree.root_idx());
            }
        }
    }

    #[test]
    fn get_proof_out_of_range() {
        let tree = IndexedMerkleTree::build(vec![input("a", 0)]).expect("builds");
        assert!(matches!(
            tree.get_proof(1),
            Err(MerkleError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn find_successor_returns_leftmost_leaf_geq_query() {
        let tree = IndexedMerkleTree::build(vec![input("a", 0), input("b", 2), input("c", 5)])
            .expect("builds");
        let (pos, _, idx) = tree.find_successor(3).expect("a successor exists");
        assert_eq!(pos, 2);
        assert_eq!(idx, 5);

        let (pos0, _, idx0) = tree.find_successor(0).expect("a successor exists");
        assert_eq!(pos0, 0);
        assert_eq!(idx0, 0);

        assert!(tree.find_successor(6).is_none());
    }

    #[test]
    fn children_at_single_leaf_tree_reports_leaf_on_both_sides() {
        let tree = IndexedMerkleTree::build(vec![input("a", 0)]).expect("builds");
        let view = tree.children_at(&[]);
        let expected = Some((hash_one(b"a"), Some(b"a".to_vec())));
        assert_eq!(view.left, expected);
        assert_eq!(view.right, expected);
    }

    #[test]
    fn find_successor_pairs_with_leaf_payload_for_cross_level_lookup() {
        // The forest looks up the next level's tree by the raw payload a
        // successor leaf carries (its child tree's un-hashed root digest),
        // never by the leaf's own hashed `val`.
        let tree = IndexedMerkleTree::build(vec![input("a", 0), input("b", 1), input("c", 5)])
            .expect("builds");
        let (pos, digest, _) = tree.find_successor(2).expect("a successor exists");
        let payload = tree.leaf_payload(pos).expect("leaf exists");
        assert_eq!(payload, b"c");
        assert_ne!(digest.as_slice(), payload, "val is hashed, payload is raw");
    }
}
