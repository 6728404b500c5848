//! Binary Merkle tree over block transactions.
//!
//! Nodes live in an arena owned by the tree and reference each other by
//! index, so parent links for proof walks never form ownership cycles. An
//! odd leaf count duplicates the trailing leaf; the duplicate is flagged so
//! `values` always returns the original multiset.

use sha2::{Digest, Sha256};

use crate::errors::{ChainError, ChainResult};

/// Items that can live in a [`Tree`] expose their leaf hash.
pub trait MerkleHashable {
    fn merkle_hash(&self) -> Vec<u8>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NodeId(usize);

#[derive(Clone, Debug)]
struct Node {
    hash: Vec<u8>,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    value: Option<usize>,
    dup: bool,
}

#[derive(Clone, Debug)]
pub struct Tree<T> {
    nodes: Vec<Node>,
    leaves: Vec<NodeId>,
    root: NodeId,
    values: Vec<T>,
}

fn combine(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().to_vec()
}

impl<T: MerkleHashable + Clone + PartialEq> Tree<T> {
    pub fn new(values: Vec<T>) -> ChainResult<Self> {
        if values.is_empty() {
            return Err(ChainError::InvalidBlock(
                "cannot build a merkle tree with no values".into(),
            ));
        }

        let mut nodes: Vec<Node> = Vec::with_capacity(values.len() * 2);
        let mut leaves: Vec<NodeId> = Vec::with_capacity(values.len() + 1);
        for (index, value) in values.iter().enumerate() {
            let id = NodeId(nodes.len());
            nodes.push(Node {
                hash: value.merkle_hash(),
                parent: None,
                left: None,
                right: None,
                value: Some(index),
                dup: false,
            });
            leaves.push(id);
        }

        if leaves.len() % 2 == 1 {
            let last = leaves[leaves.len() - 1];
            let id = NodeId(nodes.len());
            nodes.push(Node {
                hash: nodes[last.0].hash.clone(),
                parent: None,
                left: None,
                right: None,
                value: nodes[last.0].value,
                dup: true,
            });
            leaves.push(id);
        }

        let mut level = leaves.clone();
        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { pair[0] };
                let hash = combine(&nodes[left.0].hash, &nodes[right.0].hash);
                let id = NodeId(nodes.len());
                nodes.push(Node {
                    hash,
                    parent: None,
                    left: Some(left),
                    right: Some(right),
                    value: None,
                    dup: false,
                });
                nodes[left.0].parent = Some(id);
                nodes[right.0].parent = Some(id);
                next.push(id);
            }
            level = next;
        }

        let root = level[0];
        Ok(Self {
            nodes,
            leaves,
            root,
            values,
        })
    }

    /// The original values, excluding any duplicated trailing leaf.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn root_hash(&self) -> &[u8] {
        &self.nodes[self.root.0].hash
    }

    pub fn root_hex(&self) -> String {
        hex::encode(self.root_hash())
    }

    /// Sibling hashes from the value's leaf up to the root, with a parallel
    /// order list: 1 means the sibling combines on the right of the running
    /// hash, 0 on the left. Returns `None` when the value is not in the tree.
    pub fn proof(&self, value: &T) -> Option<(Vec<Vec<u8>>, Vec<u8>)> {
        let leaf = self.find_leaf(value)?;
        let mut siblings = Vec::new();
        let mut orders = Vec::new();
        let mut current = leaf;
        while let Some(parent) = self.nodes[current.0].parent {
            let (left, right) = match (self.nodes[parent.0].left, self.nodes[parent.0].right) {
                (Some(left), Some(right)) => (left, right),
                _ => return None,
            };
            if left == current {
                siblings.push(self.nodes[right.0].hash.clone());
                orders.push(1);
            } else {
                siblings.push(self.nodes[left.0].hash.clone());
                orders.push(0);
            }
            current = parent;
        }
        Some((siblings, orders))
    }

    /// Re-derives the root along the value's critical path and checks it
    /// against the stored root.
    pub fn verify(&self, value: &T) -> bool {
        let Some((siblings, orders)) = self.proof(value) else {
            return false;
        };
        let mut running = value.merkle_hash();
        for (sibling, order) in siblings.iter().zip(orders.iter()) {
            running = if *order == 1 {
                combine(&running, sibling)
            } else {
                combine(sibling, &running)
            };
        }
        running == self.nodes[self.root.0].hash
    }

    fn find_leaf(&self, value: &T) -> Option<NodeId> {
        self.leaves.iter().copied().find(|id| {
            let node = &self.nodes[id.0];
            !node.dup
                && node
                    .value
                    .map(|index| &self.values[index] == value)
                    .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests_prop;
