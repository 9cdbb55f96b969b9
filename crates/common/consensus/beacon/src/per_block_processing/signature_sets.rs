//! One function per signed object of a block, each returning the [SignatureSet] that has to
//! verify for the object to be valid. Nothing here checks a signature.

use std::{borrow::Cow, cmp::max};

use alloy_primitives::B256;
use ream_bls::{PubKey, SignatureSet, traits::Verifiable};
use ream_consensus_misc::{
    beacon_block_header::SignedBeaconBlockHeader,
    constants::{
        DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, DOMAIN_DEPOSIT, DOMAIN_RANDAO,
        DOMAIN_SYNC_COMMITTEE, DOMAIN_VOLUNTARY_EXIT,
    },
    deposit_data::DepositData,
    indexed_attestation::IndexedAttestation,
    misc::{compute_domain, compute_epoch_at_slot, compute_signing_root},
};
use ream_network_spec::networks::beacon_network_spec;
use ssz_types::{BitVector, typenum::U512};

use crate::{
    attester_slashing::AttesterSlashing,
    beacon_block::{BeaconBlock, SignedBeaconBlock},
    beacon_state::BeaconState,
    errors::SignatureSetError,
    proposer_slashing::ProposerSlashing,
    sync_aggregate::SyncAggregate,
    voluntary_exit::SignedVoluntaryExit,
};

pub type Result<T> = std::result::Result<T, SignatureSetError>;

pub fn get_pubkey(state: &BeaconState, validator_index: u64) -> Result<Cow<'_, PubKey>> {
    state
        .validators
        .get(validator_index as usize)
        .map(|validator| Cow::Borrowed(&validator.pubkey))
        .ok_or(SignatureSetError::ValidatorUnknown(validator_index))
}

/// A signature set that is valid if a block was signed by the expected block producer.
pub fn block_proposal_signature_set<'a>(
    state: &'a BeaconState,
    signed_block: &'a SignedBeaconBlock,
) -> Result<SignatureSet<'a>> {
    let block = &signed_block.message;
    let proposer_index = state.get_beacon_proposer_index()?;
    if proposer_index != block.proposer_index {
        return Err(SignatureSetError::IncorrectBlockProposer {
            block: block.proposer_index,
            local_shuffling: proposer_index,
        });
    }
    let domain = state.get_domain(
        DOMAIN_BEACON_PROPOSER,
        Some(compute_epoch_at_slot(block.slot)),
    );
    Ok(SignatureSet::single_pubkey(
        &signed_block.signature,
        get_pubkey(state, proposer_index)?,
        compute_signing_root(block, domain),
    ))
}

/// A signature set that is valid if the block proposer signed the randao reveal.
pub fn randao_signature_set<'a>(
    state: &'a BeaconState,
    block: &'a BeaconBlock,
) -> Result<SignatureSet<'a>> {
    let epoch = compute_epoch_at_slot(block.slot);
    let domain = state.get_domain(DOMAIN_RANDAO, Some(epoch));
    Ok(SignatureSet::single_pubkey(
        block.body.randao_reveal(),
        get_pubkey(state, block.proposer_index)?,
        compute_signing_root(&epoch, domain),
    ))
}

/// Returns two signature sets, one for each header of the proposer slashing.
pub fn proposer_slashing_signature_set<'a>(
    state: &'a BeaconState,
    proposer_slashing: &'a ProposerSlashing,
) -> Result<(SignatureSet<'a>, SignatureSet<'a>)> {
    let proposer_index = proposer_slashing.signed_header_1.message.proposer_index;
    let header_set = |signed_header: &'a SignedBeaconBlockHeader| -> Result<SignatureSet<'a>> {
        let domain = state.get_domain(
            DOMAIN_BEACON_PROPOSER,
            Some(compute_epoch_at_slot(signed_header.message.slot)),
        );
        Ok(SignatureSet::single_pubkey(
            &signed_header.signature,
            get_pubkey(state, proposer_index)?,
            compute_signing_root(&signed_header.message, domain),
        ))
    };
    Ok((
        header_set(&proposer_slashing.signed_header_1)?,
        header_set(&proposer_slashing.signed_header_2)?,
    ))
}

/// A signature set that is valid if the attesting validators signed the attestation data.
pub fn indexed_attestation_signature_set<'a>(
    state: &'a BeaconState,
    signature: &'a ream_bls::BLSSignature,
    indexed_attestation: &IndexedAttestation,
) -> Result<SignatureSet<'a>> {
    let pubkeys = indexed_attestation
        .attesting_indices
        .iter()
        .map(|index| get_pubkey(state, *index))
        .collect::<Result<Vec<_>>>()?;
    let domain = state.get_domain(
        DOMAIN_BEACON_ATTESTER,
        Some(indexed_attestation.data.target.epoch),
    );
    Ok(SignatureSet::multiple_pubkeys(
        signature,
        pubkeys,
        compute_signing_root(&indexed_attestation.data, domain),
    ))
}

/// Returns the signature sets of both attestations of an attester slashing.
pub fn attester_slashing_signature_sets<'a>(
    state: &'a BeaconState,
    attester_slashing: &'a AttesterSlashing,
) -> Result<(SignatureSet<'a>, SignatureSet<'a>)> {
    Ok((
        indexed_attestation_signature_set(
            state,
            &attester_slashing.attestation_1.signature,
            &attester_slashing.attestation_1,
        )?,
        indexed_attestation_signature_set(
            state,
            &attester_slashing.attestation_2.signature,
            &attester_slashing.attestation_2,
        )?,
    ))
}

/// Returns the signature set for a voluntary exit.
pub fn exit_signature_set<'a>(
    state: &'a BeaconState,
    signed_exit: &'a SignedVoluntaryExit,
) -> Result<SignatureSet<'a>> {
    let exit = &signed_exit.message;
    let domain = state.get_domain(DOMAIN_VOLUNTARY_EXIT, Some(exit.epoch));
    Ok(SignatureSet::multiple_pubkeys(
        &signed_exit.signature,
        vec![get_pubkey(state, exit.validator_index)?],
        compute_signing_root(exit, domain),
    ))
}

fn participant_pubkeys<'a>(
    state: &'a BeaconState,
    sync_committee_bits: &BitVector<U512>,
) -> Result<Vec<Cow<'a, PubKey>>> {
    let committee = &state.participation_flags()?.current_sync_committee;
    Ok(committee
        .pubkeys
        .iter()
        .enumerate()
        .filter(|(index, _)| sync_committee_bits.get(*index).unwrap_or(false))
        .map(|(_, pubkey)| Cow::Borrowed(pubkey))
        .collect())
}

/// Signature set of the sync committee over the block root of the previous slot. An aggregate
/// without participants needs no set when its signature is the point at infinity.
pub fn sync_aggregate_signature_set<'a>(
    state: &'a BeaconState,
    sync_aggregate: &'a SyncAggregate,
    block_slot: u64,
) -> Result<Option<SignatureSet<'a>>> {
    let pubkeys = participant_pubkeys(state, &sync_aggregate.sync_committee_bits)?;
    if pubkeys.is_empty() && sync_aggregate.sync_committee_signature.is_infinity() {
        return Ok(None);
    }
    let previous_slot = max(block_slot, 1) - 1;
    let domain = state.get_domain(
        DOMAIN_SYNC_COMMITTEE,
        Some(compute_epoch_at_slot(previous_slot)),
    );
    let block_root = state.get_block_root_at_slot(previous_slot)?;
    Ok(Some(SignatureSet::multiple_pubkeys(
        &sync_aggregate.sync_committee_signature,
        pubkeys,
        compute_signing_root(&block_root, domain),
    )))
}

/// Signing root of a deposit's proof of possession. Deposits are valid across forks, so the
/// domain is built from the genesis fork version alone.
pub fn deposit_signing_root(deposit_data: &DepositData) -> B256 {
    let domain = compute_domain(
        DOMAIN_DEPOSIT,
        beacon_network_spec().genesis_fork_version,
        B256::ZERO,
    );
    compute_signing_root(&deposit_data.to_deposit_message(), domain)
}

/// Whether the deposit carries a valid proof of possession of its public key.
pub fn is_valid_deposit_signature(deposit_data: &DepositData) -> bool {
    deposit_data
        .signature
        .verify(
            &deposit_data.pubkey,
            deposit_signing_root(deposit_data).as_slice(),
        )
        .unwrap_or(false)
}
