mod common;

use common::Harness;
use ream_consensus_beacon::{
    participation::has_flag, per_slot_processing::process_slots, state_transition::advance_slots,
};
use ream_consensus_misc::constants::{
    EFFECTIVE_BALANCE_INCREMENT, FAR_FUTURE_EPOCH, MAX_EFFECTIVE_BALANCE, SLOTS_PER_EPOCH,
    TIMELY_TARGET_FLAG_INDEX,
};
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};

#[test]
fn test_empty_slot_only_touches_slot_and_roots() {
    let harness = Harness::new(4, ForkName::Phase0);
    let state = advance_slots(&harness.state, 1).expect("slot advances");

    let mut advanced = advance_slots(&state, 2).expect("slot advances");
    assert_eq!(advanced.slot, 2);
    assert_ne!(advanced.state_roots, state.state_roots);
    assert_ne!(advanced.block_roots, state.block_roots);

    advanced.slot = state.slot;
    advanced.state_roots = state.state_roots.clone();
    advanced.block_roots = state.block_roots.clone();
    assert_eq!(advanced, state);
}

#[test]
fn test_first_epoch_without_attestations() {
    let harness = Harness::new(4, ForkName::Phase0);
    let mut state = harness.state.clone();

    let summaries = process_slots(&mut state, SLOTS_PER_EPOCH).expect("epoch transition runs");

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].epoch, 0);
    // Stake sums are floored at one increment
    assert_eq!(
        summaries[0].previous_epoch_target_balance,
        EFFECTIVE_BALANCE_INCREMENT
    );
    assert_eq!(
        summaries[0].current_epoch_target_balance,
        EFFECTIVE_BALANCE_INCREMENT
    );
    let pending = state.pending_attestations().expect("phase0 state");
    assert!(pending.previous_epoch_attestations.is_empty());
    assert!(pending.current_epoch_attestations.is_empty());
    assert!(
        state
            .balances
            .iter()
            .all(|balance| *balance == MAX_EFFECTIVE_BALANCE)
    );
    assert_eq!(state.validators, harness.state.validators);
}

#[test]
fn test_altair_chain_finalizes() {
    let mut harness = Harness::new(64, ForkName::Altair);
    let start_epoch = beacon_network_spec().altair_fork_epoch;
    let last_slot = (start_epoch + 2) * SLOTS_PER_EPOCH - 1;

    harness.extend_chain_with_attestations(last_slot);
    assert_eq!(harness.state.current_justified_checkpoint.epoch, start_epoch);
    assert_eq!(harness.state.finalized_checkpoint.epoch, 0);

    let balances = harness.state.balances.clone();
    let state = advance_slots(&harness.state, last_slot + 1).expect("epoch transition runs");

    assert_eq!(state.current_justified_checkpoint.epoch, start_epoch + 1);
    assert_eq!(state.finalized_checkpoint.epoch, start_epoch);
    assert!(
        state
            .balances
            .iter()
            .zip(balances.iter())
            .all(|(after, before)| after > before)
    );
    let flags = state.participation_flags().expect("altair state");
    assert!(flags.inactivity_scores.iter().all(|score| *score == 0));
    assert!(flags.current_epoch_participation.iter().all(|flag| *flag == 0));
}

#[test]
fn test_upgrade_translates_pending_attestations() {
    let mut harness = Harness::new(64, ForkName::Phase0);
    let fork_slot = beacon_network_spec().altair_fork_epoch * SLOTS_PER_EPOCH;

    harness.extend_chain_with_attestations(fork_slot - 1);
    assert_eq!(harness.state.fork_name(), ForkName::Phase0);

    let state = advance_slots(&harness.state, fork_slot).expect("fork upgrade runs");

    assert_eq!(state.fork_name(), ForkName::Altair);
    assert_eq!(
        state.fork.previous_version,
        beacon_network_spec().genesis_fork_version
    );
    let flags = state.participation_flags().expect("altair state");
    // Each slot has one committee of two; the last slot of the epoch never got included
    let target_attesters = flags
        .previous_epoch_participation
        .iter()
        .filter(|flag| has_flag(**flag, TIMELY_TARGET_FLAG_INDEX))
        .count();
    assert_eq!(target_attesters, 62);
    assert_eq!(flags.current_sync_committee, flags.next_sync_committee);
}

#[test]
fn test_validator_epochs_stay_ordered() {
    let mut harness = Harness::new(64, ForkName::Phase0);
    harness.extend_chain_with_attestations(2 * SLOTS_PER_EPOCH + 3);

    for validator in harness.state.validators.iter() {
        let epochs = [
            validator.activation_eligibility_epoch,
            validator.activation_epoch,
            validator.exit_epoch,
            validator.withdrawable_epoch,
        ]
        .into_iter()
        .filter(|epoch| *epoch != FAR_FUTURE_EPOCH)
        .collect::<Vec<_>>();
        assert!(epochs.is_sorted());
    }
}
