//! Chain-building helpers shared by the integration tests.
#![allow(dead_code)]

use alloy_primitives::B256;
use ream_bls::{
    BLSSignature, PrivateKey,
    traits::{Aggregatable, Signable},
};
use ream_consensus_beacon::{
    attestation::Attestation,
    beacon_block::{BeaconBlock, BeaconBlockBody, SignedBeaconBlock},
    beacon_state::BeaconState,
    genesis::{interop_genesis_state, interop_secret_keys},
    per_block_processing::BlockSignatureStrategy,
    per_slot_processing::process_slots,
    proposer_slashing::ProposerSlashing,
    state_transition::{apply_block, state_transition},
    voluntary_exit::{SignedVoluntaryExit, VoluntaryExit},
};
use ream_consensus_misc::{
    attestation_data::AttestationData,
    beacon_block_header::{BeaconBlockHeader, SignedBeaconBlockHeader},
    checkpoint::Checkpoint,
    constants::{
        DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, DOMAIN_RANDAO, DOMAIN_VOLUNTARY_EXIT,
    },
    misc::{compute_epoch_at_slot, compute_signing_root},
};
use ream_network_spec::{fork_name::ForkName, networks::initialize_test_network_spec};
use ssz_types::BitList;
use tree_hash::TreeHash;

pub struct Harness {
    pub keys: Vec<PrivateKey>,
    pub state: BeaconState,
}

impl Harness {
    pub fn new(validator_count: usize, fork_name: ForkName) -> Self {
        initialize_test_network_spec();
        let keys = interop_secret_keys(validator_count);
        let state = interop_genesis_state(&keys, fork_name).expect("genesis should build");
        Self { keys, state }
    }

    pub fn sign(&self, validator_index: u64, message: B256) -> BLSSignature {
        self.keys[validator_index as usize]
            .sign(message.as_slice())
            .expect("signing succeeds")
    }

    /// A copy of the current state advanced to ``slot``.
    pub fn state_at(&self, slot: u64) -> BeaconState {
        let mut state = self.state.clone();
        if slot > state.slot {
            process_slots(&mut state, slot).expect("slots advance");
        }
        state
    }

    /// A fully signed block at ``slot`` on top of the current state. ``fill_body`` sees the state
    /// the block is applied to and may add operations to the empty body.
    pub fn make_block(
        &self,
        slot: u64,
        fill_body: impl FnOnce(&BeaconState, &mut BeaconBlockBody),
    ) -> SignedBeaconBlock {
        let pre_state = self.state_at(slot);
        let proposer_index = pre_state
            .get_beacon_proposer_index()
            .expect("proposer exists");
        let epoch = compute_epoch_at_slot(slot);

        let mut body = BeaconBlockBody::empty(pre_state.fork_name());
        fill_body(&pre_state, &mut body);
        let randao_reveal = self.sign(
            proposer_index,
            compute_signing_root(&epoch, pre_state.get_domain(DOMAIN_RANDAO, Some(epoch))),
        );
        match &mut body {
            BeaconBlockBody::Phase0(body) => body.randao_reveal = randao_reveal,
            BeaconBlockBody::Altair(body) => body.randao_reveal = randao_reveal,
        }

        let mut signed_block = SignedBeaconBlock {
            message: BeaconBlock {
                slot,
                proposer_index,
                parent_root: pre_state.latest_block_header.tree_hash_root(),
                state_root: B256::ZERO,
                body,
            },
            signature: BLSSignature::default(),
        };
        let post_state = state_transition(
            &self.state,
            &signed_block,
            BlockSignatureStrategy::NoVerification,
            false,
        )
        .expect("block should apply");
        signed_block.message.state_root = post_state.tree_hash_root();
        signed_block.signature = self.sign(
            proposer_index,
            compute_signing_root(
                &signed_block.message,
                pre_state.get_domain(DOMAIN_BEACON_PROPOSER, Some(epoch)),
            ),
        );
        signed_block
    }

    pub fn apply(&mut self, signed_block: &SignedBeaconBlock, verify_signatures: bool) {
        self.state =
            apply_block(&self.state, signed_block, verify_signatures).expect("block is valid");
    }

    /// Produce one block per slot up to and including ``last_slot``, each carrying attestations
    /// of every committee of the previous slot.
    pub fn extend_chain_with_attestations(&mut self, last_slot: u64) {
        while self.state.slot < last_slot {
            let slot = self.state.slot + 1;
            let signed_block = self.make_block(slot, |state, body| {
                for attestation in committee_attestations(state, slot - 1) {
                    push_attestation(body, attestation);
                }
            });
            self.apply(&signed_block, false);
        }
    }

    /// Attestations of every committee at ``slot`` with all members voting, signed by each member.
    pub fn signed_committee_attestations(
        &self,
        state: &BeaconState,
        slot: u64,
    ) -> Vec<Attestation> {
        committee_attestations(state, slot)
            .into_iter()
            .map(|mut attestation| {
                let committee = state
                    .get_beacon_committee(slot, attestation.data.index)
                    .expect("committee exists");
                let signing_root = compute_signing_root(
                    &attestation.data,
                    state.get_domain(DOMAIN_BEACON_ATTESTER, Some(attestation.data.target.epoch)),
                );
                let signatures = committee
                    .iter()
                    .map(|index| self.sign(*index, signing_root))
                    .collect::<Vec<_>>();
                attestation.signature =
                    BLSSignature::aggregate(&signatures.iter().collect::<Vec<_>>())
                        .expect("aggregation succeeds");
                attestation
            })
            .collect()
    }

    pub fn signed_exit(
        &self,
        state: &BeaconState,
        validator_index: u64,
        epoch: u64,
    ) -> SignedVoluntaryExit {
        let message = VoluntaryExit {
            epoch,
            validator_index,
        };
        let signature = self.sign(
            validator_index,
            compute_signing_root(
                &message,
                state.get_domain(DOMAIN_VOLUNTARY_EXIT, Some(epoch)),
            ),
        );
        SignedVoluntaryExit { message, signature }
    }

    pub fn signed_header(
        &self,
        state: &BeaconState,
        header: BeaconBlockHeader,
    ) -> SignedBeaconBlockHeader {
        let signature = self.sign(
            header.proposer_index,
            compute_signing_root(
                &header,
                state.get_domain(
                    DOMAIN_BEACON_PROPOSER,
                    Some(compute_epoch_at_slot(header.slot)),
                ),
            ),
        );
        SignedBeaconBlockHeader {
            message: header,
            signature,
        }
    }

    /// Two signed headers by ``proposer_index`` for the current slot, differing in state root only.
    pub fn proposer_slashing(&self, state: &BeaconState, proposer_index: u64) -> ProposerSlashing {
        let header = BeaconBlockHeader {
            slot: state.slot,
            proposer_index,
            parent_root: B256::repeat_byte(1),
            state_root: B256::repeat_byte(2),
            body_root: B256::repeat_byte(3),
        };
        ProposerSlashing {
            signed_header_1: self.signed_header(state, header.clone()),
            signed_header_2: self.signed_header(
                state,
                BeaconBlockHeader {
                    state_root: B256::repeat_byte(4),
                    ..header
                },
            ),
        }
    }
}

/// Unsigned attestations of every committee at ``slot`` with all members voting for the
/// canonical head, target and the source the state expects.
pub fn committee_attestations(state: &BeaconState, slot: u64) -> Vec<Attestation> {
    let epoch = compute_epoch_at_slot(slot);
    let source = if epoch == state.get_current_epoch() {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    let target = Checkpoint {
        epoch,
        root: state.get_block_root(epoch).expect("target root known"),
    };
    let beacon_block_root = state
        .get_block_root_at_slot(slot)
        .expect("head root known");

    (0..state.get_committee_count_per_slot(epoch))
        .map(|index| {
            let committee = state
                .get_beacon_committee(slot, index)
                .expect("committee exists");
            let mut aggregation_bits =
                BitList::with_capacity(committee.len()).expect("committee fits");
            for position in 0..committee.len() {
                aggregation_bits
                    .set(position, true)
                    .expect("bit in range");
            }
            Attestation {
                aggregation_bits,
                data: AttestationData {
                    slot,
                    index,
                    beacon_block_root,
                    source,
                    target,
                },
                signature: BLSSignature::default(),
            }
        })
        .collect()
}

macro_rules! body_push {
    ($name: ident, $field: ident, $ty: ty) => {
        pub fn $name(body: &mut BeaconBlockBody, item: $ty) {
            match body {
                BeaconBlockBody::Phase0(body) => body.$field.push(item),
                BeaconBlockBody::Altair(body) => body.$field.push(item),
            }
            .expect("operation list has room");
        }
    };
}

body_push!(push_attestation, attestations, Attestation);
body_push!(push_proposer_slashing, proposer_slashings, ProposerSlashing);
body_push!(push_exit, voluntary_exits, SignedVoluntaryExit);
