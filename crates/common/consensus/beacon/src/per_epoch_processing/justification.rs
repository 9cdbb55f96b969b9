use ream_consensus_misc::{
    checkpoint::Checkpoint,
    constants::{GENESIS_EPOCH, JUSTIFICATION_BITS_LENGTH},
};
use tracing::info;

use crate::{
    beacon_state::BeaconState,
    epoch_cache::EpochProcessCache,
    errors::{BeaconStateError, EpochProcessingError},
};

pub fn process_justification_and_finalization(
    state: &mut BeaconState,
    cache: &EpochProcessCache,
) -> Result<(), EpochProcessingError> {
    // Initial FFG checkpoint values have a `0x00` stub for `root`.
    // Skip FFG updates in the first two epochs to avoid corner cases that might result in
    // modifying this stub.
    if cache.current_epoch <= GENESIS_EPOCH + 1 {
        return Ok(());
    }
    weigh_justification_and_finalization(
        state,
        cache.total_active_balance,
        cache.previous_epoch_target_balance(),
        cache.current_epoch_target_balance(),
    )
}

fn is_supermajority(target_balance: u64, total_active_balance: u64) -> bool {
    target_balance as u128 * 3 >= total_active_balance as u128 * 2
}

pub fn weigh_justification_and_finalization(
    state: &mut BeaconState,
    total_active_balance: u64,
    previous_epoch_target_balance: u64,
    current_epoch_target_balance: u64,
) -> Result<(), EpochProcessingError> {
    let previous_epoch = state.get_previous_epoch();
    let current_epoch = state.get_current_epoch();
    let old_previous_justified_checkpoint = state.previous_justified_checkpoint;
    let old_current_justified_checkpoint = state.current_justified_checkpoint;
    let old_finalized_checkpoint = state.finalized_checkpoint;

    // Process justifications
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    let mut bits = state.justification_bits.iter().collect::<Vec<bool>>();
    bits.rotate_right(1);
    bits[0] = false;

    if is_supermajority(previous_epoch_target_balance, total_active_balance) {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous_epoch,
            root: state.get_block_root(previous_epoch)?,
        };
        bits[1] = true;
    }
    if is_supermajority(current_epoch_target_balance, total_active_balance) {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current_epoch,
            root: state.get_block_root(current_epoch)?,
        };
        bits[0] = true;
    }
    for (index, bit) in bits.iter().enumerate().take(JUSTIFICATION_BITS_LENGTH) {
        state
            .justification_bits
            .set(index, *bit)
            .map_err(|err| BeaconStateError::Bitfield(format!("{err:?}")))?;
    }

    // Process finalizations
    // The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source
    if bits[1..4].iter().all(|&bit| bit)
        && old_previous_justified_checkpoint.epoch + 3 == current_epoch
    {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }
    // The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source
    if bits[1..3].iter().all(|&bit| bit)
        && old_previous_justified_checkpoint.epoch + 2 == current_epoch
    {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }
    // The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source
    if bits[0..3].iter().all(|&bit| bit)
        && old_current_justified_checkpoint.epoch + 2 == current_epoch
    {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }
    // The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source
    if bits[0..2].iter().all(|&bit| bit)
        && old_current_justified_checkpoint.epoch + 1 == current_epoch
    {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }

    if state.finalized_checkpoint != old_finalized_checkpoint {
        info!(
            epoch = state.finalized_checkpoint.epoch,
            root = ?state.finalized_checkpoint.root,
            "finalized checkpoint advanced"
        );
    }
    Ok(())
}
