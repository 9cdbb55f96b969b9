use std::cmp::min;

use ream_consensus_misc::{
    constants::{
        DEPOSIT_CONTRACT_TREE_DEPTH, FAR_FUTURE_EPOCH, MAX_DEPOSITS,
        MIN_ATTESTATION_INCLUSION_DELAY, PARTICIPATION_FLAG_WEIGHTS, PROPOSER_WEIGHT,
        SLOTS_PER_EPOCH, TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX,
        TIMELY_TARGET_FLAG_INDEX, WEIGHT_DENOMINATOR,
    },
    attestation_data::AttestationData,
    indexed_attestation::IndexedAttestation,
    misc::{compute_epoch_at_slot, integer_squareroot, is_sorted_and_unique},
    pending_attestation::PendingAttestation,
    validator::Validator,
};
use ream_merkle::is_valid_merkle_branch;
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};
use tracing::warn;
use tree_hash::TreeHash;

use super::{
    VerifySignatures,
    signature_sets::{
        exit_signature_set, indexed_attestation_signature_set, is_valid_deposit_signature,
        proposer_slashing_signature_set,
    },
};
use crate::{
    attestation::Attestation,
    attester_slashing::AttesterSlashing,
    beacon_block::BeaconBlockBody,
    beacon_state::BeaconState,
    deposit::Deposit,
    errors::{
        AttestationInvalid, AttesterSlashingInvalid, BeaconStateError, BlockOperationError,
        BlockProcessingError, DepositInvalid, ExitInvalid, IndexedAttestationInvalid,
        IntoWithIndex, ProposerSlashingInvalid,
    },
    participation::{EpochParticipation, add_flag, has_flag},
    proposer_slashing::ProposerSlashing,
    voluntary_exit::SignedVoluntaryExit,
};

pub fn process_operations(
    state: &mut BeaconState,
    body: &BeaconBlockBody,
    proposer_index: u64,
    verify_signatures: VerifySignatures,
) -> Result<(), BlockProcessingError> {
    // Verify that outstanding deposits are processed up to the maximum number of deposits
    let expected = min(
        MAX_DEPOSITS,
        state
            .eth1_data
            .deposit_count
            .saturating_sub(state.eth1_deposit_index),
    );
    let found = body.deposits().len() as u64;
    if found != expected {
        return Err(BlockProcessingError::DepositCountInvalid { expected, found });
    }

    process_proposer_slashings(state, body.proposer_slashings(), verify_signatures)?;
    process_attester_slashings(state, body.attester_slashings(), verify_signatures)?;
    process_attestations(state, body.attestations(), proposer_index, verify_signatures)?;
    process_deposits(state, body.deposits())?;
    process_exits(state, body.voluntary_exits(), verify_signatures)?;
    Ok(())
}

pub fn process_proposer_slashings(
    state: &mut BeaconState,
    proposer_slashings: &[ProposerSlashing],
    verify_signatures: VerifySignatures,
) -> Result<(), BlockProcessingError> {
    for (index, proposer_slashing) in proposer_slashings.iter().enumerate() {
        verify_proposer_slashing(state, proposer_slashing, verify_signatures)
            .map_err(|err| err.into_with_index(index))?;
        state.slash_validator(proposer_slashing.signed_header_1.message.proposer_index, None)?;
    }
    Ok(())
}

pub fn verify_proposer_slashing(
    state: &BeaconState,
    proposer_slashing: &ProposerSlashing,
    verify_signatures: VerifySignatures,
) -> Result<(), BlockOperationError<ProposerSlashingInvalid>> {
    let header_1 = &proposer_slashing.signed_header_1.message;
    let header_2 = &proposer_slashing.signed_header_2.message;

    // Verify header slots match
    if header_1.slot != header_2.slot {
        return Err(BlockOperationError::invalid(
            ProposerSlashingInvalid::ProposalSlotMismatch(header_1.slot, header_2.slot),
        ));
    }

    // Verify header proposer indices match
    if header_1.proposer_index != header_2.proposer_index {
        return Err(BlockOperationError::invalid(
            ProposerSlashingInvalid::ProposerIndexMismatch(
                header_1.proposer_index,
                header_2.proposer_index,
            ),
        ));
    }

    // Verify the headers are different
    if header_1 == header_2 {
        return Err(BlockOperationError::invalid(
            ProposerSlashingInvalid::ProposalsIdentical,
        ));
    }

    // Verify the proposer is slashable
    let proposer_index = header_1.proposer_index;
    let proposer = state.validators.get(proposer_index as usize).ok_or(
        BlockOperationError::invalid(ProposerSlashingInvalid::ProposerUnknown(proposer_index)),
    )?;
    if !proposer.is_slashable_validator(state.get_current_epoch()) {
        return Err(BlockOperationError::invalid(
            ProposerSlashingInvalid::ProposerNotSlashable(proposer_index),
        ));
    }

    if verify_signatures.is_true() {
        let (signature_set_1, signature_set_2) =
            proposer_slashing_signature_set(state, proposer_slashing)?;
        if !signature_set_1.verify() {
            return Err(BlockOperationError::invalid(
                ProposerSlashingInvalid::BadProposal1Signature,
            ));
        }
        if !signature_set_2.verify() {
            return Err(BlockOperationError::invalid(
                ProposerSlashingInvalid::BadProposal2Signature,
            ));
        }
    }

    Ok(())
}

pub fn process_attester_slashings(
    state: &mut BeaconState,
    attester_slashings: &[AttesterSlashing],
    verify_signatures: VerifySignatures,
) -> Result<(), BlockProcessingError> {
    for (index, attester_slashing) in attester_slashings.iter().enumerate() {
        let slashable_indices =
            verify_attester_slashing(state, attester_slashing, verify_signatures)
                .map_err(|err| err.into_with_index(index))?;
        for validator_index in slashable_indices {
            state.slash_validator(validator_index, None)?;
        }
    }
    Ok(())
}

/// Returns the validators the attester slashing slashes, in ascending order.
pub fn verify_attester_slashing(
    state: &BeaconState,
    attester_slashing: &AttesterSlashing,
    verify_signatures: VerifySignatures,
) -> Result<Vec<u64>, BlockOperationError<AttesterSlashingInvalid>> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    if !attestation_1
        .data
        .is_slashable_attestation_data(&attestation_2.data)
    {
        return Err(BlockOperationError::invalid(
            AttesterSlashingInvalid::NotSlashable,
        ));
    }

    is_valid_indexed_attestation(state, attestation_1, verify_signatures)
        .map_err(|err| err.map_invalid(AttesterSlashingInvalid::IndexedAttestation1Invalid))?;
    is_valid_indexed_attestation(state, attestation_2, verify_signatures)
        .map_err(|err| err.map_invalid(AttesterSlashingInvalid::IndexedAttestation2Invalid))?;

    // Attesting indices are sorted, so membership is a binary search
    let current_epoch = state.get_current_epoch();
    let indices_2 = &attestation_2.attesting_indices;
    let mut slashable_indices = vec![];
    for index in attestation_1.attesting_indices.iter() {
        if indices_2.binary_search(index).is_ok()
            && state.validator(*index)?.is_slashable_validator(current_epoch)
        {
            slashable_indices.push(*index);
        }
    }

    if slashable_indices.is_empty() {
        return Err(BlockOperationError::invalid(
            AttesterSlashingInvalid::NoSlashableIndices,
        ));
    }
    Ok(slashable_indices)
}

/// Checks the attesting indices of ``indexed_attestation`` without touching its signature.
pub fn verify_indexed_attestation_indices(
    state: &BeaconState,
    indexed_attestation: &IndexedAttestation,
) -> Result<(), IndexedAttestationInvalid> {
    let indices = &indexed_attestation.attesting_indices;
    if indices.is_empty() {
        return Err(IndexedAttestationInvalid::IndicesEmpty);
    }
    if !is_sorted_and_unique(indices) {
        return Err(IndexedAttestationInvalid::BadValidatorIndicesOrdering);
    }
    if let Some(unknown) = indices
        .iter()
        .find(|index| **index as usize >= state.validators.len())
    {
        return Err(IndexedAttestationInvalid::UnknownValidator(*unknown));
    }
    Ok(())
}

/// Check if ``indexed_attestation`` is not empty, has sorted and unique indices and has a valid
/// aggregate signature.
pub fn is_valid_indexed_attestation(
    state: &BeaconState,
    indexed_attestation: &IndexedAttestation,
    verify_signatures: VerifySignatures,
) -> Result<(), BlockOperationError<IndexedAttestationInvalid>> {
    verify_indexed_attestation_indices(state, indexed_attestation)
        .map_err(BlockOperationError::invalid)?;

    if verify_signatures.is_true() {
        let signature_set = indexed_attestation_signature_set(
            state,
            &indexed_attestation.signature,
            indexed_attestation,
        )?;
        if !signature_set.verify() {
            return Err(BlockOperationError::invalid(
                IndexedAttestationInvalid::BadSignature,
            ));
        }
    }
    Ok(())
}

/// Checks the committee index and the aggregation bits against the committee, then builds the
/// indexed form of ``attestation``.
pub fn get_checked_indexed_attestation(
    state: &BeaconState,
    attestation: &Attestation,
) -> Result<IndexedAttestation, BlockOperationError<AttestationInvalid>> {
    let data = &attestation.data;
    let committee_count = state.get_committee_count_per_slot(data.target.epoch);
    if data.index >= committee_count {
        return Err(BlockOperationError::invalid(
            AttestationInvalid::BadCommitteeIndex {
                index: data.index,
                committee_count,
            },
        ));
    }

    let committee = state.get_beacon_committee(data.slot, data.index)?;
    if attestation.aggregation_bits.len() != committee.len() {
        return Err(BlockOperationError::invalid(
            AttestationInvalid::BadAggregationBitfieldLength {
                committee: committee.len(),
                bits: attestation.aggregation_bits.len(),
            },
        ));
    }

    Ok(state.get_indexed_attestation(attestation)?)
}

/// Verify the timing and checkpoints of ``attestation`` for inclusion at the state slot.
pub fn verify_attestation_for_block_inclusion(
    state: &BeaconState,
    attestation: &Attestation,
) -> Result<(), BlockOperationError<AttestationInvalid>> {
    let data = &attestation.data;
    let current_epoch = state.get_current_epoch();
    if data.target.epoch != state.get_previous_epoch() && data.target.epoch != current_epoch {
        return Err(BlockOperationError::invalid(
            AttestationInvalid::BadTargetEpoch {
                target: data.target.epoch,
                current: current_epoch,
            },
        ));
    }
    if data.target.epoch != compute_epoch_at_slot(data.slot) {
        return Err(BlockOperationError::invalid(
            AttestationInvalid::TargetEpochSlotMismatch {
                target: data.target.epoch,
                slot: data.slot,
            },
        ));
    }
    if data.slot + MIN_ATTESTATION_INCLUSION_DELAY > state.slot {
        return Err(BlockOperationError::invalid(
            AttestationInvalid::IncludedTooEarly {
                state: state.slot,
                attestation: data.slot,
            },
        ));
    }
    if state.slot > data.slot + SLOTS_PER_EPOCH {
        return Err(BlockOperationError::invalid(
            AttestationInvalid::IncludedTooLate {
                state: state.slot,
                attestation: data.slot,
            },
        ));
    }

    let justified_checkpoint = if data.target.epoch == current_epoch {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    if data.source != justified_checkpoint {
        return Err(BlockOperationError::invalid(
            AttestationInvalid::WrongJustifiedCheckpoint,
        ));
    }
    Ok(())
}

/// Full validation of ``attestation``, returning its indexed form.
pub fn verify_attestation(
    state: &BeaconState,
    attestation: &Attestation,
    verify_signatures: VerifySignatures,
) -> Result<IndexedAttestation, BlockOperationError<AttestationInvalid>> {
    verify_attestation_for_block_inclusion(state, attestation)?;
    let indexed_attestation = get_checked_indexed_attestation(state, attestation)?;
    is_valid_indexed_attestation(state, &indexed_attestation, verify_signatures)
        .map_err(|err| err.map_invalid(AttestationInvalid::BadIndexedAttestation))?;
    Ok(indexed_attestation)
}

pub fn process_attestations(
    state: &mut BeaconState,
    attestations: &[Attestation],
    proposer_index: u64,
    verify_signatures: VerifySignatures,
) -> Result<(), BlockProcessingError> {
    // Computed lazily: a block without altair attestations never needs the total active balance
    let mut base_reward_per_increment = None;
    for (index, attestation) in attestations.iter().enumerate() {
        let indexed_attestation = verify_attestation(state, attestation, verify_signatures)
            .map_err(|err| err.into_with_index(index))?;
        match state.fork_name() {
            ForkName::Phase0 => {
                record_pending_attestation(state, attestation, proposer_index)?
            }
            ForkName::Altair => {
                let base_reward_per_increment = match base_reward_per_increment {
                    Some(value) => value,
                    None => {
                        let value = state.get_base_reward_per_increment()?;
                        base_reward_per_increment = Some(value);
                        value
                    }
                };
                update_participation_flags(
                    state,
                    attestation,
                    &indexed_attestation.attesting_indices,
                    proposer_index,
                    base_reward_per_increment,
                )?
            }
        }
    }
    Ok(())
}

/// Phase0: keep the attestation for the epoch transition.
fn record_pending_attestation(
    state: &mut BeaconState,
    attestation: &Attestation,
    proposer_index: u64,
) -> Result<(), BeaconStateError> {
    let current_epoch = state.get_current_epoch();
    let pending_attestation = PendingAttestation {
        aggregation_bits: attestation.aggregation_bits.clone(),
        data: attestation.data.clone(),
        inclusion_delay: state.slot - attestation.data.slot,
        proposer_index,
    };
    let pending_attestations = state.pending_attestations_mut()?;
    let list = if attestation.data.target.epoch == current_epoch {
        &mut pending_attestations.current_epoch_attestations
    } else {
        &mut pending_attestations.previous_epoch_attestations
    };
    list.push(pending_attestation)
        .map_err(|_| BeaconStateError::ListFull("pending attestations"))
}

/// Return the flag indices that are satisfied by an attestation included ``inclusion_delay``
/// slots after its slot.
pub fn get_attestation_participation_flag_indices(
    state: &BeaconState,
    data: &AttestationData,
    inclusion_delay: u64,
) -> Result<Vec<u8>, BeaconStateError> {
    let justified_checkpoint = if data.target.epoch == state.get_current_epoch() {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };

    // Matching roots
    let is_matching_source = data.source == justified_checkpoint;
    let is_matching_target =
        is_matching_source && data.target.root == state.get_block_root(data.target.epoch)?;
    let is_matching_head = is_matching_target
        && data.beacon_block_root == state.get_block_root_at_slot(data.slot)?;

    let mut participation_flag_indices = vec![];
    if is_matching_source && inclusion_delay <= integer_squareroot(SLOTS_PER_EPOCH) {
        participation_flag_indices.push(TIMELY_SOURCE_FLAG_INDEX);
    }
    if is_matching_target && inclusion_delay <= SLOTS_PER_EPOCH {
        participation_flag_indices.push(TIMELY_TARGET_FLAG_INDEX);
    }
    if is_matching_head && inclusion_delay == MIN_ATTESTATION_INCLUSION_DELAY {
        participation_flag_indices.push(TIMELY_HEAD_FLAG_INDEX);
    }
    Ok(participation_flag_indices)
}

/// Altair: set the newly earned flags of every attester and reward the proposer for them.
fn update_participation_flags(
    state: &mut BeaconState,
    attestation: &Attestation,
    attesting_indices: &[u64],
    proposer_index: u64,
    base_reward_per_increment: u64,
) -> Result<(), BeaconStateError> {
    let data = &attestation.data;
    let participation_flag_indices =
        get_attestation_participation_flag_indices(state, data, state.slot - data.slot)?;
    let base_rewards = attesting_indices
        .iter()
        .map(|index| Ok((*index, state.get_base_reward(*index, base_reward_per_increment)?)))
        .collect::<Result<Vec<_>, BeaconStateError>>()?;

    let is_current_epoch = data.target.epoch == state.get_current_epoch();
    let flags = state.participation_flags_mut()?;
    let epoch_participation = if is_current_epoch {
        &mut flags.current_epoch_participation
    } else {
        &mut flags.previous_epoch_participation
    };

    let mut proposer_reward_numerator = 0;
    for (index, base_reward) in base_rewards {
        let participation = epoch_participation
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))?;
        for (flag_index, weight) in PARTICIPATION_FLAG_WEIGHTS.iter().enumerate() {
            let flag_index = flag_index as u8;
            if participation_flag_indices.contains(&flag_index)
                && !has_flag(*participation, flag_index)
            {
                *participation = add_flag(*participation, flag_index);
                proposer_reward_numerator += base_reward * weight;
            }
        }
    }

    // Reward proposer
    let proposer_reward_denominator =
        (WEIGHT_DENOMINATOR - PROPOSER_WEIGHT) * WEIGHT_DENOMINATOR / PROPOSER_WEIGHT;
    state.increase_balance(
        proposer_index,
        proposer_reward_numerator / proposer_reward_denominator,
    )
}

pub fn process_deposits(
    state: &mut BeaconState,
    deposits: &[Deposit],
) -> Result<(), BlockProcessingError> {
    for (index, deposit) in deposits.iter().enumerate() {
        process_deposit(state, deposit).map_err(|err| err.into_with_index(index))?;
    }
    Ok(())
}

pub fn process_deposit(
    state: &mut BeaconState,
    deposit: &Deposit,
) -> Result<(), BlockOperationError<DepositInvalid>> {
    // Verify the Merkle branch, the proof carries the list length as its last node
    if !is_valid_merkle_branch(
        deposit.data.tree_hash_root(),
        &deposit.proof,
        DEPOSIT_CONTRACT_TREE_DEPTH + 1,
        state.eth1_deposit_index,
        state.eth1_data.deposit_root,
    ) {
        return Err(BlockOperationError::invalid(DepositInvalid::BadMerkleProof));
    }

    // Deposits must be processed in order
    state.eth1_deposit_index += 1;

    let data = &deposit.data;
    if let Some(index) = state
        .validators
        .iter()
        .position(|validator| validator.pubkey == data.pubkey)
    {
        state.increase_balance(index as u64, data.amount)?;
        return Ok(());
    }

    // Deposits of new validators must prove possession of the key. The deposit contract does
    // not check this, so an invalid proof skips the deposit instead of rejecting the block.
    if !is_valid_deposit_signature(data) {
        warn!(
            pubkey = ?data.pubkey,
            amount = data.amount,
            "skipping deposit with invalid proof of possession"
        );
        return Ok(());
    }

    state
        .validators
        .push(Validator::from_deposit(
            data.pubkey.clone(),
            data.withdrawal_credentials,
            data.amount,
        ))
        .map_err(|_| BeaconStateError::ListFull("validators"))?;
    state
        .balances
        .push(data.amount)
        .map_err(|_| BeaconStateError::ListFull("balances"))?;
    if let EpochParticipation::Altair(flags) = &mut state.participation {
        flags
            .previous_epoch_participation
            .push(0)
            .map_err(|_| BeaconStateError::ListFull("previous epoch participation"))?;
        flags
            .current_epoch_participation
            .push(0)
            .map_err(|_| BeaconStateError::ListFull("current epoch participation"))?;
        flags
            .inactivity_scores
            .push(0)
            .map_err(|_| BeaconStateError::ListFull("inactivity scores"))?;
    }
    Ok(())
}

pub fn process_exits(
    state: &mut BeaconState,
    voluntary_exits: &[SignedVoluntaryExit],
    verify_signatures: VerifySignatures,
) -> Result<(), BlockProcessingError> {
    for (index, signed_exit) in voluntary_exits.iter().enumerate() {
        verify_exit(state, signed_exit, verify_signatures)
            .map_err(|err| err.into_with_index(index))?;
        state.initiate_validator_exit(signed_exit.message.validator_index)?;
    }
    Ok(())
}

pub fn verify_exit(
    state: &BeaconState,
    signed_exit: &SignedVoluntaryExit,
    verify_signatures: VerifySignatures,
) -> Result<(), BlockOperationError<ExitInvalid>> {
    let exit = &signed_exit.message;
    let current_epoch = state.get_current_epoch();
    let validator = state.validators.get(exit.validator_index as usize).ok_or(
        BlockOperationError::invalid(ExitInvalid::ValidatorUnknown(exit.validator_index)),
    )?;

    // Verify the validator is active
    if !validator.is_active_validator(current_epoch) {
        return Err(BlockOperationError::invalid(ExitInvalid::NotActive(
            exit.validator_index,
        )));
    }

    // Verify exit has not been initiated
    if validator.exit_epoch != FAR_FUTURE_EPOCH {
        return Err(BlockOperationError::invalid(ExitInvalid::AlreadyExited {
            validator: exit.validator_index,
            exit_epoch: validator.exit_epoch,
        }));
    }

    // Exits must specify an epoch when they become valid; they are not valid before then
    if current_epoch < exit.epoch {
        return Err(BlockOperationError::invalid(ExitInvalid::FutureEpoch {
            state_epoch: current_epoch,
            exit_epoch: exit.epoch,
        }));
    }

    // Verify the validator has been active long enough
    let earliest_exit_epoch = validator
        .activation_epoch
        .saturating_add(beacon_network_spec().shard_committee_period);
    if current_epoch < earliest_exit_epoch {
        return Err(BlockOperationError::invalid(ExitInvalid::TooYoungToExit {
            activation_epoch: validator.activation_epoch,
            earliest_exit_epoch,
        }));
    }

    if verify_signatures.is_true() && !exit_signature_set(state, signed_exit)?.verify() {
        return Err(BlockOperationError::invalid(ExitInvalid::BadSignature));
    }
    Ok(())
}
