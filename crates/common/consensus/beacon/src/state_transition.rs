//! Top-level entry points. Both functions leave the input state untouched and return the
//! post-state, so a rejected block never leaves a half-applied state behind.

use tree_hash::TreeHash;

use crate::{
    beacon_block::SignedBeaconBlock,
    beacon_state::BeaconState,
    errors::{SlotProcessingError, StateTransitionError},
    per_block_processing::{BlockSignatureStrategy, process_block},
    per_slot_processing::process_slots,
};

/// Advance a copy of ``state`` to the block's slot, apply the block and optionally check that
/// the resulting state root is the one committed to by the block.
pub fn state_transition(
    state: &BeaconState,
    signed_block: &SignedBeaconBlock,
    block_signature_strategy: BlockSignatureStrategy,
    verify_state_root: bool,
) -> Result<BeaconState, StateTransitionError> {
    let block = &signed_block.message;
    let mut state = state.clone();

    // Process slots (including those with no blocks) since block
    if state.slot < block.slot {
        process_slots(&mut state, block.slot)?;
    }

    process_block(&mut state, signed_block, block_signature_strategy)?;

    if verify_state_root {
        let computed = state.tree_hash_root();
        if computed != block.state_root {
            return Err(StateTransitionError::StateRootMismatch {
                block: block.state_root,
                computed,
            });
        }
    }

    Ok(state)
}

/// Apply ``signed_block`` to ``state``. With ``verify_signatures`` every signature of the block
/// except deposit signatures is checked in one batch before the state is touched.
pub fn apply_block(
    state: &BeaconState,
    signed_block: &SignedBeaconBlock,
    verify_signatures: bool,
) -> Result<BeaconState, StateTransitionError> {
    let block_signature_strategy = if verify_signatures {
        BlockSignatureStrategy::VerifyBulk
    } else {
        BlockSignatureStrategy::NoVerification
    };
    state_transition(state, signed_block, block_signature_strategy, true)
}

/// Run empty slots, with their epoch transitions and fork upgrades, until ``target_slot``.
pub fn advance_slots(
    state: &BeaconState,
    target_slot: u64,
) -> Result<BeaconState, StateTransitionError> {
    if target_slot < state.slot {
        return Err(SlotProcessingError::SlotInPast {
            state: state.slot,
            target: target_slot,
        }
        .into());
    }

    let mut state = state.clone();
    if target_slot > state.slot {
        process_slots(&mut state, target_slot)?;
    }
    Ok(state)
}
