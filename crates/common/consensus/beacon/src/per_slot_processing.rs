use alloy_primitives::B256;
use ream_consensus_misc::constants::{SLOTS_PER_EPOCH, SLOTS_PER_HISTORICAL_ROOT};
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};
use tracing::trace;
use tree_hash::TreeHash;

use crate::{
    beacon_state::BeaconState,
    errors::SlotProcessingError,
    per_epoch_processing::{EpochProcessingSummary, process_epoch},
    upgrade::upgrade_to_altair,
};

/// Cache the roots of the previous slot.
pub fn process_slot(state: &mut BeaconState) {
    // Cache state root
    let previous_state_root = state.tree_hash_root();
    let index = (state.slot % SLOTS_PER_HISTORICAL_ROOT) as usize;
    state.state_roots[index] = previous_state_root;

    // Cache latest block header state root
    if state.latest_block_header.state_root == B256::ZERO {
        state.latest_block_header.state_root = previous_state_root;
    }

    // Cache block root
    state.block_roots[index] = state.latest_block_header.tree_hash_root();
}

/// Advance ``state`` to ``slot``, running the epoch transition at the end of every epoch and the
/// altair upgrade at the first slot of the altair fork epoch.
///
/// Returns the summary of every epoch transition that ran.
pub fn process_slots(
    state: &mut BeaconState,
    slot: u64,
) -> Result<Vec<EpochProcessingSummary>, SlotProcessingError> {
    if slot <= state.slot {
        return Err(SlotProcessingError::SlotInPast {
            state: state.slot,
            target: slot,
        });
    }

    let network_spec = beacon_network_spec();
    let mut summaries = vec![];
    while state.slot < slot {
        process_slot(state);

        // Process epoch on the start slot of the next epoch
        if (state.slot + 1) % SLOTS_PER_EPOCH == 0 {
            summaries.push(process_epoch(state)?);
        }
        state.slot += 1;

        if network_spec.is_altair_upgrade_slot(state.slot) && state.fork_name() == ForkName::Phase0
        {
            upgrade_to_altair(state)?;
        }
        trace!(slot = state.slot, fork = %state.fork_name(), "processed slot");
    }
    Ok(summaries)
}
