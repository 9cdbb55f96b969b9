//! Epoch transition. Every stage reads the [EpochProcessCache] built once at the start and the
//! stages run in a fixed order; the two forks differ only behind [ForkVariant].

pub mod altair;
pub mod justification;
pub mod phase0;
pub mod registry_updates;
pub mod resets;
pub mod slashings;

use ream_consensus_misc::{checkpoint::Checkpoint, constants::GENESIS_EPOCH};
use ream_metrics::{EPOCH_PROCESSING_TIME, start_timer_vec, stop_timer};
use ream_network_spec::fork_name::ForkName;
use ssz_types::VariableList;
use tracing::debug;

use crate::{
    beacon_state::BeaconState,
    epoch_cache::EpochProcessCache,
    errors::{BeaconStateError, EpochProcessingError},
};

/// The parts of the epoch transition whose behaviour depends on the fork.
pub trait ForkVariant {
    const FORK: ForkName;

    /// Set the timely bits of every status from the fork's participation bookkeeping.
    fn update_attester_statuses(
        state: &BeaconState,
        cache: &mut EpochProcessCache,
    ) -> Result<(), EpochProcessingError>;

    fn process_inactivity_updates(
        _state: &mut BeaconState,
        _cache: &EpochProcessCache,
    ) -> Result<(), EpochProcessingError> {
        Ok(())
    }

    /// Compute every balance after rewards and penalties against the current balances.
    fn compute_rewards(
        state: &BeaconState,
        cache: &EpochProcessCache,
    ) -> Result<Vec<u64>, EpochProcessingError>;

    fn proportional_slashing_multiplier() -> u64;

    fn rotate_participation(state: &mut BeaconState) -> Result<(), EpochProcessingError>;

    fn process_sync_committee_updates(
        _state: &mut BeaconState,
        _cache: &EpochProcessCache,
    ) -> Result<(), EpochProcessingError> {
        Ok(())
    }
}

/// What an epoch transition did, for logging and inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochProcessingSummary {
    pub fork: ForkName,
    pub epoch: u64,
    pub total_active_balance: u64,
    pub previous_epoch_target_balance: u64,
    pub current_epoch_target_balance: u64,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub activated: usize,
    pub ejected: usize,
    pub slashed: usize,
}

pub fn process_epoch(
    state: &mut BeaconState,
) -> Result<EpochProcessingSummary, EpochProcessingError> {
    match state.fork_name() {
        ForkName::Phase0 => process_epoch_with::<phase0::Phase0>(state),
        ForkName::Altair => process_epoch_with::<altair::Altair>(state),
    }
}

pub fn process_epoch_with<V: ForkVariant>(
    state: &mut BeaconState,
) -> Result<EpochProcessingSummary, EpochProcessingError> {
    let cache = EpochProcessCache::build::<V>(state)?;
    cache.ensure_covers(state)?;

    let timer = start_timer_vec(&EPOCH_PROCESSING_TIME, &["justification_and_finalization"]);
    justification::process_justification_and_finalization(state, &cache)?;
    stop_timer(timer);

    let timer = start_timer_vec(&EPOCH_PROCESSING_TIME, &["inactivity_updates"]);
    V::process_inactivity_updates(state, &cache)?;
    stop_timer(timer);

    let timer = start_timer_vec(&EPOCH_PROCESSING_TIME, &["rewards_and_penalties"]);
    process_rewards_and_penalties::<V>(state, &cache)?;
    stop_timer(timer);

    let timer = start_timer_vec(&EPOCH_PROCESSING_TIME, &["registry_updates"]);
    let activated = registry_updates::process_registry_updates(state, &cache)?;
    stop_timer(timer);

    let timer = start_timer_vec(&EPOCH_PROCESSING_TIME, &["slashings"]);
    slashings::process_slashings(state, &cache, V::proportional_slashing_multiplier())?;
    stop_timer(timer);

    let timer = start_timer_vec(&EPOCH_PROCESSING_TIME, &["resets"]);
    resets::process_eth1_data_reset(state);
    resets::process_effective_balance_updates(state);
    resets::process_slashings_reset(state);
    resets::process_randao_mixes_reset(state);
    resets::process_historical_roots_update(state)?;
    stop_timer(timer);

    let timer = start_timer_vec(&EPOCH_PROCESSING_TIME, &["participation_rotation"]);
    V::rotate_participation(state)?;
    stop_timer(timer);

    let timer = start_timer_vec(&EPOCH_PROCESSING_TIME, &["sync_committee_updates"]);
    V::process_sync_committee_updates(state, &cache)?;
    stop_timer(timer);

    let summary = EpochProcessingSummary {
        fork: V::FORK,
        epoch: cache.current_epoch,
        total_active_balance: cache.total_active_balance,
        previous_epoch_target_balance: cache.previous_epoch_target_balance(),
        current_epoch_target_balance: cache.current_epoch_target_balance(),
        current_justified_checkpoint: state.current_justified_checkpoint,
        finalized_checkpoint: state.finalized_checkpoint,
        activated,
        ejected: cache.indices_to_eject.len(),
        slashed: cache.indices_to_slash.len(),
    };
    debug!(?summary, "processed epoch");
    Ok(summary)
}

/// Replace every balance at once with the balances computed by the fork.
pub fn process_rewards_and_penalties<V: ForkVariant>(
    state: &mut BeaconState,
    cache: &EpochProcessCache,
) -> Result<(), EpochProcessingError> {
    // No rewards are applied at the end of `GENESIS_EPOCH` because rewards are for work done in
    // the previous epoch
    if cache.current_epoch == GENESIS_EPOCH {
        return Ok(());
    }
    let balances = V::compute_rewards(state, cache)?;
    if balances.len() != state.balances.len() {
        return Err(EpochProcessingError::ValidatorStatusesInconsistent {
            statuses: balances.len(),
            validators: state.balances.len(),
        });
    }
    state.balances =
        VariableList::new(balances).map_err(|_| BeaconStateError::ListFull("balances"))?;
    Ok(())
}
