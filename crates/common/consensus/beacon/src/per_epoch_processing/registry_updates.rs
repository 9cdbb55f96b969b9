use ream_consensus_misc::misc::compute_activation_exit_epoch;
use tracing::debug;

use crate::{
    beacon_state::BeaconState, epoch_cache::EpochProcessCache, errors::EpochProcessingError,
};

/// Process ejections, activation eligibility and activations. Returns the number of validators
/// scheduled for activation.
pub fn process_registry_updates(
    state: &mut BeaconState,
    cache: &EpochProcessCache,
) -> Result<usize, EpochProcessingError> {
    let current_epoch = cache.current_epoch;

    for &index in &cache.indices_to_eject {
        state.initiate_validator_exit(index)?;
    }

    for &index in &cache.indices_to_queue {
        state.validator_mut(index)?.activation_eligibility_epoch = current_epoch + 1;
    }

    // Dequeue validators for activation up to churn limit. The queue is sorted by eligibility
    // epoch, so the first validator not yet finalized ends the dequeue.
    let finalized_epoch = state.finalized_checkpoint.epoch;
    let activation_epoch = compute_activation_exit_epoch(current_epoch);
    let mut activated = 0;
    for &index in cache
        .indices_eligible_for_activation
        .iter()
        .take(cache.churn_limit as usize)
    {
        let validator = state.validator_mut(index)?;
        if !validator.is_eligible_for_activation(finalized_epoch) {
            break;
        }
        validator.activation_epoch = activation_epoch;
        activated += 1;
    }

    debug!(
        ejected = cache.indices_to_eject.len(),
        queued = cache.indices_to_queue.len(),
        activated,
        "processed registry updates"
    );
    Ok(activated)
}
