use std::cmp::min;

use ream_consensus_misc::constants::EFFECTIVE_BALANCE_INCREMENT;
use tracing::debug;

use crate::{
    beacon_state::BeaconState,
    epoch_cache::EpochProcessCache,
    errors::{BeaconStateError, EpochProcessingError},
};

/// Penalize the validators whose slashing reached the middle of the slashings vector, in
/// proportion to the total slashed in that window.
pub fn process_slashings(
    state: &mut BeaconState,
    cache: &EpochProcessCache,
    proportional_slashing_multiplier: u64,
) -> Result<(), EpochProcessingError> {
    if cache.indices_to_slash.is_empty() {
        return Ok(());
    }
    let total_balance = cache.total_active_balance;
    let total_slashings = state
        .slashings
        .iter()
        .try_fold(0u64, |total, slashing| total.checked_add(*slashing))
        .ok_or(BeaconStateError::ArithmeticOverflow("total slashings"))?;
    let adjusted_total_slashing_balance = min(
        total_slashings.saturating_mul(proportional_slashing_multiplier),
        total_balance,
    );

    for &index in &cache.indices_to_slash {
        let effective_balance_increments =
            state.validator(index)?.effective_balance / EFFECTIVE_BALANCE_INCREMENT;
        // Widened so that the numerator cannot overflow
        let penalty_numerator =
            effective_balance_increments as u128 * adjusted_total_slashing_balance as u128;
        let penalty = (penalty_numerator / total_balance as u128) as u64
            * EFFECTIVE_BALANCE_INCREMENT;
        state.decrease_balance(index, penalty)?;
        debug!(index, penalty, "applied correlated slashing penalty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ream_consensus_misc::constants::{
        EPOCHS_PER_SLASHINGS_VECTOR, MAX_EFFECTIVE_BALANCE, PROPORTIONAL_SLASHING_MULTIPLIER,
        PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR, SLOTS_PER_EPOCH,
    };
    use ream_network_spec::{fork_name::ForkName, networks::initialize_test_network_spec};
    use rstest::rstest;

    use super::*;
    use crate::genesis::{interop_genesis_state, interop_secret_keys};

    #[rstest]
    #[case::phase0(PROPORTIONAL_SLASHING_MULTIPLIER, 3_000_000_000)]
    #[case::altair(PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR, 6_000_000_000)]
    fn test_correlated_penalty(#[case] multiplier: u64, #[case] expected_penalty: u64) {
        initialize_test_network_spec();
        let mut state = interop_genesis_state(&interop_secret_keys(10), ForkName::Phase0)
            .expect("genesis should build");
        let epoch = 100;
        state.slot = epoch * SLOTS_PER_EPOCH;
        state.validators[0].slashed = true;
        state.validators[0].withdrawable_epoch = epoch + EPOCHS_PER_SLASHINGS_VECTOR / 2;
        // one validator slashed in this window, out of 320 ETH active
        state.slashings[3] = MAX_EFFECTIVE_BALANCE;

        let cache = EpochProcessCache::new(&state).unwrap();
        assert_eq!(cache.indices_to_slash, vec![0]);
        process_slashings(&mut state, &cache, multiplier).unwrap();

        // 32 * 32 * multiplier / 320 increments, floored
        assert_eq!(state.balances[0], MAX_EFFECTIVE_BALANCE - expected_penalty);
        assert_eq!(state.balances[1], MAX_EFFECTIVE_BALANCE);
    }

    #[test]
    fn test_penalty_clamps_to_zero() {
        initialize_test_network_spec();
        let mut state = interop_genesis_state(&interop_secret_keys(4), ForkName::Phase0)
            .expect("genesis should build");
        state.slot = 50 * SLOTS_PER_EPOCH;
        state.validators[1].slashed = true;
        state.validators[1].withdrawable_epoch = 50 + EPOCHS_PER_SLASHINGS_VECTOR / 2;
        state.balances[1] = 1;
        state.slashings[0] = 4 * MAX_EFFECTIVE_BALANCE;

        let cache = EpochProcessCache::new(&state).unwrap();
        process_slashings(&mut state, &cache, PROPORTIONAL_SLASHING_MULTIPLIER).unwrap();
        assert_eq!(state.balances[1], 0);
    }
}
