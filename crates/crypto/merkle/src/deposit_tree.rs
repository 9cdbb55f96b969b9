use alloy_primitives::B256;
use anyhow::ensure;

use crate::hash::hash_concat;

/// Emulates the eth1 deposit contract tree: a sparse tree of fixed ``depth`` whose root has the
/// number of deposits mixed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositDataTree {
    leaves: Vec<B256>,
    depth: usize,
    zero_hashes: Vec<B256>,
}

impl DepositDataTree {
    /// Create a tree from a list of leaves (``DepositData`` roots) and a fixed depth.
    pub fn create(leaves: &[B256], depth: usize) -> anyhow::Result<Self> {
        ensure!(
            leaves.len() as u128 <= 1u128 << depth,
            "Too many leaves for a tree of depth {depth}"
        );
        let mut zero_hashes = vec![B256::ZERO];
        for level in 0..depth {
            let zero = zero_hashes[level];
            zero_hashes.push(hash_concat(zero.as_slice(), zero.as_slice()));
        }
        Ok(Self {
            leaves: leaves.to_vec(),
            depth,
            zero_hashes,
        })
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn push_leaf(&mut self, leaf: B256) -> anyhow::Result<()> {
        ensure!(
            (self.leaves.len() as u128) < 1u128 << self.depth,
            "Deposit tree is full"
        );
        self.leaves.push(leaf);
        Ok(())
    }

    /// Root of the tree with the number of leaves mixed in.
    pub fn root(&self) -> B256 {
        let layers = self.layers();
        let tree_root = layers
            .last()
            .and_then(|layer| layer.first().copied())
            .unwrap_or(self.zero_hashes[self.depth]);
        hash_concat(tree_root.as_slice(), self.length_bytes().as_slice())
    }

    /// Return the leaf at `index` and its branch in bottom-up order. The branch has ``depth + 1``
    /// nodes, the last being the length mix-in.
    pub fn generate_proof(&self, index: usize) -> anyhow::Result<(B256, Vec<B256>)> {
        ensure!(index < self.leaves.len(), "Leaf index {index} out of bounds");
        let layers = self.layers();
        let mut proof = Vec::with_capacity(self.depth + 1);
        let mut position = index;
        for (level, layer) in layers.iter().take(self.depth).enumerate() {
            proof.push(
                layer
                    .get(position ^ 1)
                    .copied()
                    .unwrap_or(self.zero_hashes[level]),
            );
            position /= 2;
        }
        proof.push(self.length_bytes());
        Ok((self.leaves[index], proof))
    }

    fn length_bytes(&self) -> B256 {
        let mut bytes = B256::ZERO;
        bytes[..8].copy_from_slice(&(self.leaves.len() as u64).to_le_bytes());
        bytes
    }

    /// Non-zero nodes of every level, from the leaves up to the root.
    fn layers(&self) -> Vec<Vec<B256>> {
        let mut layers = vec![self.leaves.clone()];
        for level in 0..self.depth {
            let next = layers[level]
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or(self.zero_hashes[level]);
                    hash_concat(pair[0].as_slice(), right.as_slice())
                })
                .collect();
            layers.push(next);
        }
        layers
    }
}
