mod common;

use common::{Harness, push_attestation, push_exit, push_proposer_slashing};
use ream_bls::BLSSignature;
use ream_consensus_beacon::{
    beacon_block::BeaconBlockBody,
    errors::{
        BlockErrorKind, BlockProcessingError, ExitInvalid, ProposerSlashingInvalid,
        StateTransitionError,
    },
    per_block_processing::BlockSignatureStrategy,
    state_transition::{apply_block, state_transition},
};
use ream_consensus_misc::constants::{
    EPOCHS_PER_SLASHINGS_VECTOR, FAR_FUTURE_EPOCH, MAX_EFFECTIVE_BALANCE, MAX_SEED_LOOKAHEAD,
    MIN_SLASHING_PENALTY_QUOTIENT, SLOTS_PER_EPOCH, WHISTLEBLOWER_REWARD_QUOTIENT,
};
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};
use rstest::rstest;

fn block_error(result: Result<impl Sized, StateTransitionError>) -> BlockProcessingError {
    match result {
        Err(StateTransitionError::BlockProcessingError(err)) => err,
        Err(err) => panic!("unexpected error: {err}"),
        Ok(_) => panic!("block should be rejected"),
    }
}

#[test]
fn test_proposer_slashing_with_distinct_state_roots() {
    let mut harness = Harness::new(16, ForkName::Phase0);
    let pre_state = harness.state_at(1);
    let proposer_index = pre_state
        .get_beacon_proposer_index()
        .expect("proposer exists");
    let slashed_index = (proposer_index + 1) % 16;
    let proposer_slashing = harness.proposer_slashing(&pre_state, slashed_index);

    let signed_block = harness.make_block(1, |_, body| {
        push_proposer_slashing(body, proposer_slashing)
    });
    harness.apply(&signed_block, true);

    let state = &harness.state;
    let slashed = &state.validators[slashed_index as usize];
    assert!(slashed.slashed);
    assert_ne!(slashed.exit_epoch, FAR_FUTURE_EPOCH);
    assert_eq!(slashed.withdrawable_epoch, EPOCHS_PER_SLASHINGS_VECTOR);
    assert_eq!(state.slashings[0], MAX_EFFECTIVE_BALANCE);
    assert_eq!(
        state.balances[slashed_index as usize],
        MAX_EFFECTIVE_BALANCE - MAX_EFFECTIVE_BALANCE / MIN_SLASHING_PENALTY_QUOTIENT
    );
    // The proposer is also the whistleblower, so it collects the whole reward
    assert_eq!(
        state.balances[proposer_index as usize],
        MAX_EFFECTIVE_BALANCE + MAX_EFFECTIVE_BALANCE / WHISTLEBLOWER_REWARD_QUOTIENT
    );
    assert_eq!(
        state.validators.iter().filter(|validator| validator.slashed).count(),
        1
    );
}

#[test]
fn test_proposer_slashing_with_identical_headers() {
    let harness = Harness::new(16, ForkName::Phase0);
    let pre_state = harness.state_at(1);
    let mut proposer_slashing = harness.proposer_slashing(&pre_state, 3);
    proposer_slashing.signed_header_2 = proposer_slashing.signed_header_1.clone();

    // The harness refuses to build an invalid block, so the slashing goes in afterwards
    let mut signed_block = harness.make_block(1, |_, _| {});
    push_proposer_slashing(&mut signed_block.message.body, proposer_slashing);

    let err = block_error(apply_block(&harness.state, &signed_block, false));
    assert_eq!(
        err,
        BlockProcessingError::ProposerSlashingInvalid {
            index: 0,
            reason: ProposerSlashingInvalid::ProposalsIdentical,
        }
    );
    assert_eq!(err.kind(), BlockErrorKind::ConsensusRuleViolation);
}

/// A harness whose state is ``slot_in_epoch`` slots into ``epoch``, with every validator active
/// since genesis.
fn harness_at_epoch(epoch: u64, slot_in_epoch: u64) -> Harness {
    let mut harness = Harness::new(64, ForkName::Altair);
    harness.state.slot = epoch * SLOTS_PER_EPOCH + slot_in_epoch;
    harness
}

#[test]
fn test_exit_before_shard_committee_period_is_rejected() {
    let shard_committee_period = beacon_network_spec().shard_committee_period;
    let harness = harness_at_epoch(shard_committee_period - 1, 5);
    let slot = harness.state.slot + 1;
    let pre_state = harness.state_at(slot);
    let exit = harness.signed_exit(&pre_state, 7, pre_state.get_current_epoch());

    let mut signed_block = harness.make_block(slot, |_, _| {});
    push_exit(&mut signed_block.message.body, exit);

    let err = block_error(apply_block(&harness.state, &signed_block, false));
    assert_eq!(
        err,
        BlockProcessingError::ExitInvalid {
            index: 0,
            reason: ExitInvalid::TooYoungToExit {
                activation_epoch: 0,
                earliest_exit_epoch: shard_committee_period,
            },
        }
    );
}

#[test]
fn test_exit_after_shard_committee_period_is_accepted() {
    let shard_committee_period = beacon_network_spec().shard_committee_period;
    let mut harness = harness_at_epoch(shard_committee_period, 5);
    let slot = harness.state.slot + 1;
    let pre_state = harness.state_at(slot);
    let exit = harness.signed_exit(&pre_state, 7, pre_state.get_current_epoch());

    let signed_block = harness.make_block(slot, |_, body| push_exit(body, exit));
    harness.apply(&signed_block, true);

    let validator = &harness.state.validators[7];
    let exit_epoch = shard_committee_period + 1 + MAX_SEED_LOOKAHEAD;
    assert_eq!(validator.exit_epoch, exit_epoch);
    assert_eq!(
        validator.withdrawable_epoch,
        exit_epoch + beacon_network_spec().min_validator_withdrawability_delay
    );
}

#[rstest]
#[case(4, vec![0, 0, 0, 0])]
#[case(6, vec![0, 0, 0, 0, 1, 1])]
#[case(9, vec![0, 0, 0, 0, 1, 1, 1, 1, 2])]
fn test_exit_queue_churn(#[case] exits: u64, #[case] expected_offsets: Vec<u64>) {
    let shard_committee_period = beacon_network_spec().shard_committee_period;
    let mut harness = harness_at_epoch(shard_committee_period, 5);
    let slot = harness.state.slot + 1;
    let pre_state = harness.state_at(slot);
    assert_eq!(pre_state.get_validator_churn_limit(), 4);

    let signed_exits = (0..exits)
        .map(|index| harness.signed_exit(&pre_state, index, pre_state.get_current_epoch()))
        .collect::<Vec<_>>();
    let signed_block = harness.make_block(slot, |_, body| {
        for exit in signed_exits {
            push_exit(body, exit);
        }
    });
    harness.apply(&signed_block, true);

    let first_exit_epoch = shard_committee_period + 1 + MAX_SEED_LOOKAHEAD;
    let exit_epochs = harness.state.validators[..exits as usize]
        .iter()
        .map(|validator| validator.exit_epoch - first_exit_epoch)
        .collect::<Vec<_>>();
    assert_eq!(exit_epochs, expected_offsets);
}

#[test]
fn test_bulk_and_individual_verification_agree() {
    let harness = Harness::new(64, ForkName::Phase0);
    let pre_state = harness.state_at(2);
    let attestations = harness.signed_committee_attestations(&pre_state, 1);
    let proposer_index = pre_state
        .get_beacon_proposer_index()
        .expect("proposer exists");
    let proposer_slashing = harness.proposer_slashing(&pre_state, (proposer_index + 1) % 64);

    let signed_block = harness.make_block(2, |_, body| {
        for attestation in attestations {
            push_attestation(body, attestation);
        }
        push_proposer_slashing(body, proposer_slashing);
    });

    let bulk = state_transition(
        &harness.state,
        &signed_block,
        BlockSignatureStrategy::VerifyBulk,
        true,
    )
    .expect("bulk verification passes");
    let individual = state_transition(
        &harness.state,
        &signed_block,
        BlockSignatureStrategy::VerifyIndividual,
        true,
    )
    .expect("individual verification passes");
    assert_eq!(bulk, individual);
}

#[test]
fn test_bad_attestation_signature_is_rejected_by_both_strategies() {
    let harness = Harness::new(64, ForkName::Phase0);
    let pre_state = harness.state_at(2);
    let mut attestations = harness.signed_committee_attestations(&pre_state, 1);
    attestations[0].signature = BLSSignature::infinity();

    let signed_block = harness.make_block(2, |_, body| {
        for attestation in attestations {
            push_attestation(body, attestation);
        }
    });

    let bulk = block_error(state_transition(
        &harness.state,
        &signed_block,
        BlockSignatureStrategy::VerifyBulk,
        true,
    ));
    assert_eq!(bulk, BlockProcessingError::BulkSignatureVerificationFailed);

    let individual = block_error(state_transition(
        &harness.state,
        &signed_block,
        BlockSignatureStrategy::VerifyIndividual,
        true,
    ));
    assert!(matches!(
        individual,
        BlockProcessingError::AttestationInvalid { index: 0, .. }
    ));
    assert_eq!(individual.kind(), BlockErrorKind::InvalidSignature);
    assert_eq!(bulk.kind(), BlockErrorKind::InvalidSignature);
}

#[test]
fn test_tampered_randao_reveal_is_rejected() {
    let harness = Harness::new(16, ForkName::Phase0);
    let mut signed_block = harness.make_block(1, |_, _| {});
    if let BeaconBlockBody::Phase0(body) = &mut signed_block.message.body {
        body.randao_reveal = BLSSignature::infinity();
    }

    let err = block_error(state_transition(
        &harness.state,
        &signed_block,
        BlockSignatureStrategy::VerifyRandao,
        false,
    ));
    assert_eq!(err, BlockProcessingError::RandaoSignatureInvalid);
}
