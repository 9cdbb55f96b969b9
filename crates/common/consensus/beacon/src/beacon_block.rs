use alloy_primitives::B256;
use ream_bls::BLSSignature;
use ream_consensus_misc::{
    beacon_block_header::{BeaconBlockHeader, SignedBeaconBlockHeader},
    eth_1_data::Eth1Data,
};
use ream_network_spec::fork_name::ForkName;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{
    VariableList,
    typenum::{U2, U16, U128},
};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use crate::{
    attestation::Attestation, attester_slashing::AttesterSlashing, deposit::Deposit,
    proposer_slashing::ProposerSlashing, sync_aggregate::SyncAggregate,
    voluntary_exit::SignedVoluntaryExit,
};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, TreeHash)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: BLSSignature,
}

impl SignedBeaconBlock {
    pub fn signed_header(&self) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: self.message.block_header(),
            signature: self.signature.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, TreeHash)]
pub struct BeaconBlock {
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub proposer_index: u64,
    pub parent_root: B256,
    pub state_root: B256,
    pub body: BeaconBlockBody,
}

impl BeaconBlock {
    pub fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.tree_hash_root(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash, Default)]
pub struct Phase0BeaconBlockBody {
    pub randao_reveal: BLSSignature,

    /// Eth1 data vote
    pub eth1_data: Eth1Data,

    /// Arbitrary data
    pub graffiti: B256,

    // Operations
    pub proposer_slashings: VariableList<ProposerSlashing, U16>,
    pub attester_slashings: VariableList<AttesterSlashing, U2>,
    pub attestations: VariableList<Attestation, U128>,
    pub deposits: VariableList<Deposit, U16>,
    pub voluntary_exits: VariableList<SignedVoluntaryExit, U16>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct AltairBeaconBlockBody {
    pub randao_reveal: BLSSignature,

    /// Eth1 data vote
    pub eth1_data: Eth1Data,

    /// Arbitrary data
    pub graffiti: B256,

    // Operations
    pub proposer_slashings: VariableList<ProposerSlashing, U16>,
    pub attester_slashings: VariableList<AttesterSlashing, U2>,
    pub attestations: VariableList<Attestation, U128>,
    pub deposits: VariableList<Deposit, U16>,
    pub voluntary_exits: VariableList<SignedVoluntaryExit, U16>,
    pub sync_aggregate: SyncAggregate,
}

/// A block body of either fork. SSZ encoding and hashing are those of the inner body.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, TreeHash)]
#[serde(untagged)]
#[ssz(enum_behaviour = "transparent")]
#[tree_hash(enum_behaviour = "transparent")]
pub enum BeaconBlockBody {
    Altair(AltairBeaconBlockBody),
    Phase0(Phase0BeaconBlockBody),
}

macro_rules! body_field {
    ($name: ident, $ty: ty) => {
        pub fn $name(&self) -> &$ty {
            match self {
                BeaconBlockBody::Phase0(body) => &body.$name,
                BeaconBlockBody::Altair(body) => &body.$name,
            }
        }
    };
}

impl BeaconBlockBody {
    body_field!(randao_reveal, BLSSignature);
    body_field!(eth1_data, Eth1Data);
    body_field!(graffiti, B256);
    body_field!(proposer_slashings, VariableList<ProposerSlashing, U16>);
    body_field!(attester_slashings, VariableList<AttesterSlashing, U2>);
    body_field!(attestations, VariableList<Attestation, U128>);
    body_field!(deposits, VariableList<Deposit, U16>);
    body_field!(voluntary_exits, VariableList<SignedVoluntaryExit, U16>);

    pub fn sync_aggregate(&self) -> Option<&SyncAggregate> {
        match self {
            BeaconBlockBody::Phase0(_) => None,
            BeaconBlockBody::Altair(body) => Some(&body.sync_aggregate),
        }
    }

    pub fn fork_name(&self) -> ForkName {
        match self {
            BeaconBlockBody::Phase0(_) => ForkName::Phase0,
            BeaconBlockBody::Altair(_) => ForkName::Altair,
        }
    }

    /// An empty body of the given fork.
    pub fn empty(fork_name: ForkName) -> Self {
        match fork_name {
            ForkName::Phase0 => BeaconBlockBody::Phase0(Phase0BeaconBlockBody::default()),
            ForkName::Altair => BeaconBlockBody::Altair(AltairBeaconBlockBody {
                randao_reveal: BLSSignature::default(),
                eth1_data: Eth1Data::default(),
                graffiti: B256::ZERO,
                proposer_slashings: VariableList::empty(),
                attester_slashings: VariableList::empty(),
                attestations: VariableList::empty(),
                deposits: VariableList::empty(),
                voluntary_exits: VariableList::empty(),
                sync_aggregate: SyncAggregate::empty(),
            }),
        }
    }
}
