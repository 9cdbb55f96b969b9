use ream_bls::BLSSignature;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitVector, typenum::U512};
use tree_hash_derive::TreeHash;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SyncAggregate {
    pub sync_committee_bits: BitVector<U512>,
    pub sync_committee_signature: BLSSignature,
}

impl SyncAggregate {
    /// An aggregate without participants, as produced when no sync committee message was seen.
    pub fn empty() -> Self {
        Self {
            sync_committee_bits: BitVector::new(),
            sync_committee_signature: BLSSignature::infinity(),
        }
    }

    pub fn num_participants(&self) -> usize {
        self.sync_committee_bits.num_set_bits()
    }
}
