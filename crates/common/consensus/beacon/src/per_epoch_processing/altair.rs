use std::{cmp::min, mem};

use ream_consensus_misc::constants::{
    EFFECTIVE_BALANCE_INCREMENT, EPOCHS_PER_SYNC_COMMITTEE_PERIOD, GENESIS_EPOCH,
    INACTIVITY_PENALTY_QUOTIENT_ALTAIR, PARTICIPATION_FLAG_WEIGHTS,
    PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR, TIMELY_HEAD_FLAG_INDEX, WEIGHT_DENOMINATOR,
};
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};
use rayon::prelude::*;
use ssz_types::VariableList;
use tracing::debug;

use super::ForkVariant;
use crate::{
    attester_status::{
        AttesterStatus, CURRENT_EPOCH_SHIFT, PREVIOUS_EPOCH_HEAD, PREVIOUS_EPOCH_SOURCE,
        PREVIOUS_EPOCH_TARGET,
    },
    beacon_state::BeaconState,
    epoch_cache::EpochProcessCache,
    errors::{BeaconStateError, EpochProcessingError},
    participation::PARTICIPATION_FLAGS_MASK,
};

/// Participation flags, inactivity scores and sync committees.
pub struct Altair;

impl Altair {
    /// Balance of one validator after the flag deltas and the inactivity penalty, applied in
    /// that order.
    fn apply_deltas(
        status: &AttesterStatus,
        effective_balance: u64,
        inactivity_score: u64,
        balance: u64,
        cache: &EpochProcessCache,
    ) -> Result<u64, BeaconStateError> {
        if !status.is_eligible() {
            return Ok(balance);
        }
        let base_reward =
            effective_balance / EFFECTIVE_BALANCE_INCREMENT * cache.base_reward_per_increment;
        let mut balance = balance;

        for (flag_index, (flag, participating_increments)) in [
            (PREVIOUS_EPOCH_SOURCE, cache.previous_epoch_source_increments),
            (PREVIOUS_EPOCH_TARGET, cache.previous_epoch_target_increments),
            (PREVIOUS_EPOCH_HEAD, cache.previous_epoch_head_increments),
        ]
        .into_iter()
        .enumerate()
        {
            let weight = PARTICIPATION_FLAG_WEIGHTS[flag_index];
            if status.is_unslashed_and(flag) {
                if !cache.is_in_inactivity_leak {
                    let reward_numerator = base_reward
                        .checked_mul(weight * participating_increments)
                        .ok_or(BeaconStateError::ArithmeticOverflow("flag reward"))?;
                    balance = balance
                        .checked_add(
                            reward_numerator / (cache.total_active_increments * WEIGHT_DENOMINATOR),
                        )
                        .ok_or(BeaconStateError::ArithmeticOverflow("balance"))?;
                }
            } else if flag_index as u8 != TIMELY_HEAD_FLAG_INDEX {
                balance = balance.saturating_sub(base_reward * weight / WEIGHT_DENOMINATOR);
            }
        }

        if !status.is_unslashed_and(PREVIOUS_EPOCH_TARGET) {
            let penalty_numerator = effective_balance
                .checked_mul(inactivity_score)
                .ok_or(BeaconStateError::ArithmeticOverflow("inactivity penalty"))?;
            let penalty_denominator =
                beacon_network_spec().inactivity_score_bias * INACTIVITY_PENALTY_QUOTIENT_ALTAIR;
            balance = balance.saturating_sub(penalty_numerator / penalty_denominator);
        }
        Ok(balance)
    }
}

impl ForkVariant for Altair {
    const FORK: ForkName = ForkName::Altair;

    fn update_attester_statuses(
        state: &BeaconState,
        cache: &mut EpochProcessCache,
    ) -> Result<(), EpochProcessingError> {
        let flags = state.participation_flags()?;
        for list in [
            &flags.previous_epoch_participation,
            &flags.current_epoch_participation,
        ] {
            if list.len() != cache.statuses.len() {
                return Err(EpochProcessingError::ValidatorStatusesInconsistent {
                    statuses: cache.statuses.len(),
                    validators: list.len(),
                });
            }
        }

        for (((status, is_active_previous_epoch), previous), current) in cache
            .statuses
            .iter_mut()
            .zip(cache.is_active_previous_epoch.iter())
            .zip(flags.previous_epoch_participation.iter())
            .zip(flags.current_epoch_participation.iter())
        {
            if *is_active_previous_epoch {
                status.set(previous & PARTICIPATION_FLAGS_MASK);
            }
            if status.active {
                status.set((current & PARTICIPATION_FLAGS_MASK) << CURRENT_EPOCH_SHIFT);
            }
        }
        Ok(())
    }

    fn process_inactivity_updates(
        state: &mut BeaconState,
        cache: &EpochProcessCache,
    ) -> Result<(), EpochProcessingError> {
        // Score updates based on previous epoch participation, skip genesis epoch
        if cache.current_epoch == GENESIS_EPOCH {
            return Ok(());
        }
        let network_spec = beacon_network_spec();
        let scores = &mut state.participation_flags_mut()?.inactivity_scores;
        for (status, score) in cache.statuses.iter().zip(scores.iter_mut()) {
            if !status.is_eligible() {
                continue;
            }
            // Increase inactivity score of inactive validators
            if status.is_unslashed_and(PREVIOUS_EPOCH_TARGET) {
                *score -= min(1, *score);
            } else {
                *score = score
                    .checked_add(network_spec.inactivity_score_bias)
                    .ok_or(BeaconStateError::ArithmeticOverflow("inactivity score"))?;
            }
            // Decrease the score of all validators for forgiveness when not during a leak
            if !cache.is_in_inactivity_leak {
                *score -= min(network_spec.inactivity_score_recovery_rate, *score);
            }
        }
        Ok(())
    }

    fn compute_rewards(
        state: &BeaconState,
        cache: &EpochProcessCache,
    ) -> Result<Vec<u64>, EpochProcessingError> {
        let scores = &state.participation_flags()?.inactivity_scores;
        cache
            .statuses
            .par_iter()
            .zip(state.validators.par_iter())
            .zip(scores.par_iter())
            .zip(state.balances.par_iter())
            .map(
                |(((status, validator), score), balance)| -> Result<u64, EpochProcessingError> {
                    Ok(Self::apply_deltas(
                        status,
                        validator.effective_balance,
                        *score,
                        *balance,
                        cache,
                    )?)
                },
            )
            .collect()
    }

    fn proportional_slashing_multiplier() -> u64 {
        PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR
    }

    fn rotate_participation(state: &mut BeaconState) -> Result<(), EpochProcessingError> {
        let validator_count = state.validators.len();
        let flags = state.participation_flags_mut()?;
        flags.previous_epoch_participation = mem::replace(
            &mut flags.current_epoch_participation,
            VariableList::from(vec![0; validator_count]),
        );
        Ok(())
    }

    fn process_sync_committee_updates(
        state: &mut BeaconState,
        cache: &EpochProcessCache,
    ) -> Result<(), EpochProcessingError> {
        let next_epoch = cache.current_epoch + 1;
        if next_epoch % EPOCHS_PER_SYNC_COMMITTEE_PERIOD != 0 {
            return Ok(());
        }
        let next_sync_committee = state.compute_sync_committee(&cache.next_epoch_active_indices)?;
        let flags = state.participation_flags_mut()?;
        flags.current_sync_committee =
            mem::replace(&mut flags.next_sync_committee, next_sync_committee);
        debug!(next_epoch, "rotated sync committees");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ream_consensus_misc::constants::{MAX_EFFECTIVE_BALANCE, SLOTS_PER_EPOCH};
    use ream_network_spec::networks::initialize_test_network_spec;

    use super::*;
    use crate::{
        genesis::{interop_genesis_state, interop_secret_keys},
        participation::ParticipationList,
    };

    fn state_at_end_of_epoch(epoch: u64) -> BeaconState {
        initialize_test_network_spec();
        let mut state = interop_genesis_state(&interop_secret_keys(4), ForkName::Altair)
            .expect("genesis should build");
        state.slot = epoch * SLOTS_PER_EPOCH + SLOTS_PER_EPOCH - 1;
        state
    }

    fn set_previous_participation(state: &mut BeaconState, flags: u8) {
        let count = state.validators.len();
        state
            .participation_flags_mut()
            .unwrap()
            .previous_epoch_participation = ParticipationList::from(vec![flags; count]);
    }

    #[test]
    fn test_full_participation_rewards() {
        let mut state = state_at_end_of_epoch(4);
        set_previous_participation(&mut state, PARTICIPATION_FLAGS_MASK);
        let cache = EpochProcessCache::new(&state).unwrap();

        let balances = Altair::compute_rewards(&state, &cache).unwrap();
        let base_reward = 32 * cache.base_reward_per_increment;
        // every flag is earned by the whole active stake
        let reward = PARTICIPATION_FLAG_WEIGHTS
            .iter()
            .map(|weight| base_reward * weight / WEIGHT_DENOMINATOR)
            .sum::<u64>();
        assert!(
            balances
                .iter()
                .all(|balance| *balance == MAX_EFFECTIVE_BALANCE + reward)
        );
    }

    #[test]
    fn test_missing_head_is_not_penalized() {
        let mut state = state_at_end_of_epoch(4);
        set_previous_participation(&mut state, 0);
        let cache = EpochProcessCache::new(&state).unwrap();

        let balances = Altair::compute_rewards(&state, &cache).unwrap();
        let base_reward = 32 * cache.base_reward_per_increment;
        let penalty = base_reward * PARTICIPATION_FLAG_WEIGHTS[0] / WEIGHT_DENOMINATOR
            + base_reward * PARTICIPATION_FLAG_WEIGHTS[1] / WEIGHT_DENOMINATOR;
        assert!(
            balances
                .iter()
                .all(|balance| *balance == MAX_EFFECTIVE_BALANCE - penalty)
        );
    }

    #[test]
    fn test_inactivity_scores() {
        let mut state = state_at_end_of_epoch(4);
        let mut participation = vec![PARTICIPATION_FLAGS_MASK; 4];
        participation[2] = 0;
        state
            .participation_flags_mut()
            .unwrap()
            .previous_epoch_participation = participation.into();
        state.participation_flags_mut().unwrap().inactivity_scores[0] = 30;
        state.participation_flags_mut().unwrap().inactivity_scores[2] = 40;

        let cache = EpochProcessCache::new(&state).unwrap();
        Altair::process_inactivity_updates(&mut state, &cache).unwrap();

        let spec = beacon_network_spec();
        let scores = &state.participation_flags().unwrap().inactivity_scores;
        assert_eq!(scores[0], 30 - 1 - spec.inactivity_score_recovery_rate);
        assert_eq!(scores[1], 0);
        assert_eq!(
            scores[2],
            40 + spec.inactivity_score_bias - spec.inactivity_score_recovery_rate
        );
    }

    #[test]
    fn test_inactivity_penalty_in_leak() {
        let mut state = state_at_end_of_epoch(12);
        set_previous_participation(&mut state, 0);
        state.participation_flags_mut().unwrap().inactivity_scores[1] = 100;
        let cache = EpochProcessCache::new(&state).unwrap();
        assert!(cache.is_in_inactivity_leak);

        let balances = Altair::compute_rewards(&state, &cache).unwrap();
        let inactivity_penalty = MAX_EFFECTIVE_BALANCE * 100
            / (beacon_network_spec().inactivity_score_bias * INACTIVITY_PENALTY_QUOTIENT_ALTAIR);
        assert_eq!(balances[0] - balances[1], inactivity_penalty);
    }

    #[test]
    fn test_rotation_round_trip() {
        let mut state = state_at_end_of_epoch(4);
        let current = ParticipationList::from(vec![1, 3, 7, 0]);
        state
            .participation_flags_mut()
            .unwrap()
            .current_epoch_participation = current.clone();

        Altair::rotate_participation(&mut state).unwrap();
        let flags = state.participation_flags().unwrap();
        assert_eq!(flags.previous_epoch_participation, current);
        assert!(flags.current_epoch_participation.iter().all(|flag| *flag == 0));
        assert_eq!(flags.current_epoch_participation.len(), 4);
    }

    #[test]
    fn test_sync_committee_rotation_at_period_end() {
        let mut state = state_at_end_of_epoch(EPOCHS_PER_SYNC_COMMITTEE_PERIOD - 1);
        let previous_next = state.participation_flags().unwrap().next_sync_committee.clone();
        let cache = EpochProcessCache::new(&state).unwrap();

        Altair::process_sync_committee_updates(&mut state, &cache).unwrap();
        let flags = state.participation_flags().unwrap();
        assert_eq!(flags.current_sync_committee, previous_next);

        let mut mid_period = state_at_end_of_epoch(EPOCHS_PER_SYNC_COMMITTEE_PERIOD + 3);
        let before = mid_period.participation_flags().unwrap().clone();
        let cache = EpochProcessCache::new(&mid_period).unwrap();
        Altair::process_sync_committee_updates(&mut mid_period, &cache).unwrap();
        assert_eq!(mid_period.participation_flags().unwrap(), &before);
    }
}
