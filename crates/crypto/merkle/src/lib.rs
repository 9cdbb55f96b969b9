//! https://ethereum.github.io/consensus-specs/ssz/merkle-proofs

use alloy_primitives::B256;
use anyhow::ensure;

pub mod deposit_tree;
mod hash;
mod index;

pub use deposit_tree::DepositDataTree;
use hash::hash_concat;
use index::{generalized_index_child, get_generalized_index_bit};

/// Builds a dense tree of ``2 ** depth`` leaves, right-padded with zero leaves. Node ``i`` has its
/// children at ``2 * i`` and ``2 * i + 1``; the root is at index 1.
pub fn merkle_tree(leaves: &[B256], depth: u64) -> anyhow::Result<Vec<B256>> {
    let num_of_leaves = leaves.len();
    let bottom_length = 1 << depth;
    ensure!(
        num_of_leaves <= bottom_length,
        "Number of leaves is greater than the bottom length (depth too small)"
    );

    let mut tree = vec![B256::ZERO; bottom_length];
    tree.extend(leaves);
    tree.extend(vec![B256::ZERO; bottom_length - num_of_leaves]);

    for i in (1..bottom_length).rev() {
        let left = tree[i * 2].as_slice();
        let right = tree[i * 2 + 1].as_slice();
        tree[i] = hash_concat(left, right);
    }

    Ok(tree)
}

/// Returns the bottom-up branch of the leaf at ``index`` in a tree built by [merkle_tree].
pub fn generate_proof(tree: &[B256], index: u64, depth: u64) -> anyhow::Result<Vec<B256>> {
    let bottom_length = 1 << depth;
    ensure!(index < bottom_length, "Index out of bounds");
    ensure!(
        tree.len() as u64 == bottom_length * 2,
        "Tree does not have depth {depth}"
    );

    let mut proof = vec![];
    let mut current_index = 1;
    let mut current_depth = depth;

    while current_depth > 0 {
        let (left_child_index, right_child_index) = (
            generalized_index_child(current_index, false),
            generalized_index_child(current_index, true),
        );

        if get_generalized_index_bit(index, current_depth - 1) {
            proof.push(tree[left_child_index as usize]);
            current_index = right_child_index;
        } else {
            proof.push(tree[right_child_index as usize]);
            current_index = left_child_index;
        }

        current_depth -= 1;
    }

    proof.reverse();

    Ok(proof)
}

/// Check if ``leaf`` at ``index`` verifies against the Merkle ``root`` and ``branch``.
///
/// A branch shorter than ``depth`` never verifies.
pub fn is_valid_merkle_branch(
    leaf: B256,
    branch: &[B256],
    depth: u64,
    index: u64,
    root: B256,
) -> bool {
    if (branch.len() as u64) < depth {
        return false;
    }
    let mut value = leaf;
    for i in 0..depth {
        if get_generalized_index_bit(index, i) {
            value = hash_concat(branch[i as usize].as_slice(), value.as_slice());
        } else {
            value = hash_concat(value.as_slice(), branch[i as usize].as_slice());
        }
    }
    value == root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merkle_tree() {
        let leaves = vec![
            B256::from_slice(&[0xAA; 32]),
            B256::from_slice(&[0xBB; 32]),
            B256::from_slice(&[0xCC; 32]),
            B256::from_slice(&[0xDD; 32]),
        ];
        let depth = 2;

        let node_2: B256 = hash_concat(leaves[0].as_slice(), leaves[1].as_slice());
        let node_3: B256 = hash_concat(leaves[2].as_slice(), leaves[3].as_slice());
        let root: B256 = hash_concat(node_2.as_slice(), node_3.as_slice());

        let tree = merkle_tree(&leaves, depth).unwrap();
        assert_eq!(tree[1], root);

        for (index, leaf) in leaves.iter().enumerate() {
            let proof = generate_proof(&tree, index as u64, depth).unwrap();
            assert!(is_valid_merkle_branch(
                *leaf,
                &proof,
                depth,
                index as u64,
                root
            ));
            assert!(!is_valid_merkle_branch(
                *leaf,
                &proof,
                depth,
                (index as u64 + 1) % 4,
                root
            ));
        }
    }

    #[test]
    fn test_short_branch_is_invalid() {
        let leaf = B256::repeat_byte(1);
        assert!(!is_valid_merkle_branch(leaf, &[B256::ZERO], 2, 0, leaf));
    }
}
