use ream_consensus_misc::{
    constants::{
        EPOCHS_PER_ETH1_VOTING_PERIOD, EPOCHS_PER_HISTORICAL_VECTOR, EPOCHS_PER_SLASHINGS_VECTOR,
        SLOTS_PER_EPOCH, SLOTS_PER_HISTORICAL_ROOT,
    },
    historical_batch::HistoricalBatch,
};
use ssz_types::VariableList;
use tree_hash::TreeHash;

use crate::{beacon_state::BeaconState, errors::BeaconStateError};

pub fn process_eth1_data_reset(state: &mut BeaconState) {
    let next_epoch = state.get_current_epoch() + 1;
    // Reset eth1 data votes
    if next_epoch % EPOCHS_PER_ETH1_VOTING_PERIOD == 0 {
        state.eth1_data_votes = VariableList::default();
    }
}

/// Update effective balances with hysteresis.
pub fn process_effective_balance_updates(state: &mut BeaconState) {
    for (validator, balance) in state.validators.iter_mut().zip(state.balances.iter()) {
        if let Some(effective_balance) = validator.updated_effective_balance(*balance) {
            validator.effective_balance = effective_balance;
        }
    }
}

pub fn process_slashings_reset(state: &mut BeaconState) {
    let next_epoch = state.get_current_epoch() + 1;
    state.slashings[(next_epoch % EPOCHS_PER_SLASHINGS_VECTOR) as usize] = 0;
}

pub fn process_randao_mixes_reset(state: &mut BeaconState) {
    let current_epoch = state.get_current_epoch();
    let next_epoch = current_epoch + 1;
    state.randao_mixes[(next_epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize] =
        state.get_randao_mix(current_epoch);
}

/// Append the root of the last ``SLOTS_PER_HISTORICAL_ROOT`` block and state roots.
pub fn process_historical_roots_update(state: &mut BeaconState) -> Result<(), BeaconStateError> {
    let next_epoch = state.get_current_epoch() + 1;
    if next_epoch % (SLOTS_PER_HISTORICAL_ROOT / SLOTS_PER_EPOCH) == 0 {
        let historical_batch = HistoricalBatch {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };
        state
            .historical_roots
            .push(historical_batch.tree_hash_root())
            .map_err(|_| BeaconStateError::ListFull("historical_roots"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use ream_consensus_misc::{
        constants::{EFFECTIVE_BALANCE_INCREMENT, MAX_EFFECTIVE_BALANCE},
        eth_1_data::Eth1Data,
    };
    use ream_network_spec::{fork_name::ForkName, networks::initialize_test_network_spec};

    use super::*;
    use crate::genesis::{interop_genesis_state, interop_secret_keys};

    fn genesis() -> BeaconState {
        initialize_test_network_spec();
        interop_genesis_state(&interop_secret_keys(4), ForkName::Phase0)
            .expect("genesis should build")
    }

    #[test]
    fn test_eth1_votes_reset_at_period_end() {
        let mut state = genesis();
        state.eth1_data_votes.push(Eth1Data::default()).unwrap();
        state.slot = (EPOCHS_PER_ETH1_VOTING_PERIOD - 2) * SLOTS_PER_EPOCH;
        process_eth1_data_reset(&mut state);
        assert_eq!(state.eth1_data_votes.len(), 1);
        state.slot += SLOTS_PER_EPOCH;
        process_eth1_data_reset(&mut state);
        assert!(state.eth1_data_votes.is_empty());
    }

    #[test]
    fn test_effective_balance_hysteresis() {
        let mut state = genesis();
        // a quarter increment below is inside the downward threshold
        state.balances[0] = MAX_EFFECTIVE_BALANCE - EFFECTIVE_BALANCE_INCREMENT / 4;
        // just past the downward threshold
        state.balances[1] = MAX_EFFECTIVE_BALANCE - EFFECTIVE_BALANCE_INCREMENT / 4 - 1;
        state.balances[2] = 2 * MAX_EFFECTIVE_BALANCE;
        process_effective_balance_updates(&mut state);
        assert_eq!(state.validators[0].effective_balance, MAX_EFFECTIVE_BALANCE);
        assert_eq!(
            state.validators[1].effective_balance,
            MAX_EFFECTIVE_BALANCE - EFFECTIVE_BALANCE_INCREMENT
        );
        assert_eq!(state.validators[2].effective_balance, MAX_EFFECTIVE_BALANCE);
    }

    #[test]
    fn test_ring_buffers_roll_forward() {
        let mut state = genesis();
        state.slot = 7 * SLOTS_PER_EPOCH;
        state.slashings[8] = 5;
        state.randao_mixes[7] = B256::repeat_byte(7);
        process_slashings_reset(&mut state);
        process_randao_mixes_reset(&mut state);
        assert_eq!(state.slashings[8], 0);
        assert_eq!(state.randao_mixes[8], B256::repeat_byte(7));
    }

    #[test]
    fn test_historical_roots_every_period() {
        let mut state = genesis();
        let period = SLOTS_PER_HISTORICAL_ROOT / SLOTS_PER_EPOCH;
        state.slot = (period - 2) * SLOTS_PER_EPOCH;
        process_historical_roots_update(&mut state).unwrap();
        assert!(state.historical_roots.is_empty());
        state.slot = (period - 1) * SLOTS_PER_EPOCH;
        process_historical_roots_update(&mut state).unwrap();
        assert_eq!(state.historical_roots.len(), 1);
        assert_eq!(
            state.historical_roots[0],
            HistoricalBatch {
                block_roots: state.block_roots.clone(),
                state_roots: state.state_roots.clone(),
            }
            .tree_hash_root()
        );
    }
}
