use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

use crate::checkpoint::Checkpoint;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Hash)]
pub struct AttestationData {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub index: u64,

    /// LMD GHOST vote
    pub beacon_block_root: B256,

    /// FFG vote
    pub source: Checkpoint,
    pub target: Checkpoint,
}

impl AttestationData {
    /// Check if ``self`` and ``other`` are slashable according to Casper FFG rules.
    pub fn is_slashable_attestation_data(&self, other: &AttestationData) -> bool {
        // Double vote
        (self != other && self.target.epoch == other.target.epoch) ||
        // Surround vote
        (self.source.epoch < other.source.epoch && other.target.epoch < self.target.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(source: u64, target: u64, root: u8) -> AttestationData {
        AttestationData {
            slot: target * 32,
            index: 0,
            beacon_block_root: B256::repeat_byte(root),
            source: Checkpoint {
                epoch: source,
                root: B256::ZERO,
            },
            target: Checkpoint {
                epoch: target,
                root: B256::ZERO,
            },
        }
    }

    #[test]
    fn test_double_vote() {
        assert!(data(1, 3, 1).is_slashable_attestation_data(&data(1, 3, 2)));
        assert!(!data(1, 3, 1).is_slashable_attestation_data(&data(1, 3, 1)));
    }

    #[test]
    fn test_surround_vote() {
        assert!(data(1, 5, 1).is_slashable_attestation_data(&data(2, 4, 1)));
        // Surrounded is not slashable from this side.
        assert!(!data(2, 4, 1).is_slashable_attestation_data(&data(1, 5, 1)));
        assert!(!data(1, 4, 1).is_slashable_attestation_data(&data(2, 5, 1)));
    }
}
