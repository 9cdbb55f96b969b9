use std::mem;

use ream_consensus_misc::{
    constants::{
        BASE_REWARD_FACTOR, BASE_REWARDS_PER_EPOCH, INACTIVITY_PENALTY_QUOTIENT,
        PROPORTIONAL_SLASHING_MULTIPLIER, PROPOSER_REWARD_QUOTIENT,
    },
    pending_attestation::PendingAttestation,
};
use ream_network_spec::fork_name::ForkName;
use rayon::prelude::*;

use super::ForkVariant;
use crate::{
    attester_status::{
        AttesterStatus, CURRENT_EPOCH_SHIFT, PREVIOUS_EPOCH_HEAD, PREVIOUS_EPOCH_SOURCE,
        PREVIOUS_EPOCH_TARGET,
    },
    beacon_state::BeaconState,
    epoch_cache::EpochProcessCache,
    errors::{BeaconStateError, EpochProcessingError},
};

/// Pending attestation lists, rewards per vote component.
pub struct Phase0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Delta {
    reward: u64,
    penalty: u64,
}

impl Delta {
    fn reward(&mut self, amount: u64) -> Result<(), BeaconStateError> {
        self.reward = self
            .reward
            .checked_add(amount)
            .ok_or(BeaconStateError::ArithmeticOverflow("reward"))?;
        Ok(())
    }

    fn penalize(&mut self, amount: u64) -> Result<(), BeaconStateError> {
        self.penalty = self
            .penalty
            .checked_add(amount)
            .ok_or(BeaconStateError::ArithmeticOverflow("penalty"))?;
        Ok(())
    }
}

/// Flags earned by a pending attestation, given as previous-epoch bits.
fn attestation_flags(
    state: &BeaconState,
    attestation: &PendingAttestation,
    epoch: u64,
) -> Result<u8, BeaconStateError> {
    let mut flags = PREVIOUS_EPOCH_SOURCE;
    if attestation.data.target.root == state.get_block_root(epoch)? {
        flags |= PREVIOUS_EPOCH_TARGET;
        if attestation.data.beacon_block_root
            == state.get_block_root_at_slot(attestation.data.slot)?
        {
            flags |= PREVIOUS_EPOCH_HEAD;
        }
    }
    Ok(flags)
}

impl Phase0 {
    pub fn get_base_reward(effective_balance: u64, cache: &EpochProcessCache) -> u64 {
        effective_balance * BASE_REWARD_FACTOR
            / cache.sqrt_total_active_balance
            / BASE_REWARDS_PER_EPOCH
    }

    /// Source, target, head and inactivity deltas of one validator. Inclusion rewards involve the
    /// proposer and are added separately.
    fn validator_delta(
        status: &AttesterStatus,
        effective_balance: u64,
        cache: &EpochProcessCache,
    ) -> Result<Delta, BeaconStateError> {
        let mut delta = Delta::default();
        if !status.is_eligible() {
            return Ok(delta);
        }
        let base_reward = Self::get_base_reward(effective_balance, cache);

        for (flag, attesting_increments) in [
            (PREVIOUS_EPOCH_SOURCE, cache.previous_epoch_source_increments),
            (PREVIOUS_EPOCH_TARGET, cache.previous_epoch_target_increments),
            (PREVIOUS_EPOCH_HEAD, cache.previous_epoch_head_increments),
        ] {
            if status.is_unslashed_and(flag) {
                if cache.is_in_inactivity_leak {
                    // Optimal participation is fully rewarded to cancel the inactivity penalty
                    delta.reward(base_reward)?;
                } else {
                    delta.reward(
                        base_reward * attesting_increments / cache.total_active_increments,
                    )?;
                }
            } else {
                delta.penalize(base_reward)?;
            }
        }

        if cache.is_in_inactivity_leak {
            // If validator is performing optimally this cancels all rewards for a neutral balance
            delta.penalize(
                BASE_REWARDS_PER_EPOCH * base_reward - base_reward / PROPOSER_REWARD_QUOTIENT,
            )?;
            if !status.is_unslashed_and(PREVIOUS_EPOCH_TARGET) {
                let penalty = effective_balance
                    .checked_mul(cache.finality_delay)
                    .ok_or(BeaconStateError::ArithmeticOverflow("inactivity penalty"))?
                    / INACTIVITY_PENALTY_QUOTIENT;
                delta.penalize(penalty)?;
            }
        }
        Ok(delta)
    }
}

impl ForkVariant for Phase0 {
    const FORK: ForkName = ForkName::Phase0;

    fn update_attester_statuses(
        state: &BeaconState,
        cache: &mut EpochProcessCache,
    ) -> Result<(), EpochProcessingError> {
        let pending = state.pending_attestations()?;
        for attestation in pending.previous_epoch_attestations.iter() {
            let flags = attestation_flags(state, attestation, cache.previous_epoch)?;
            let attesting_indices =
                state.get_attesting_indices(&attestation.data, &attestation.aggregation_bits)?;
            for index in attesting_indices {
                let status = cache
                    .statuses
                    .get_mut(index as usize)
                    .ok_or(BeaconStateError::UnknownValidator(index))?;
                status.set(flags);
                status.record_inclusion(attestation.inclusion_delay, attestation.proposer_index);
            }
        }
        for attestation in pending.current_epoch_attestations.iter() {
            let flags = attestation_flags(state, attestation, cache.current_epoch)?
                << CURRENT_EPOCH_SHIFT;
            let attesting_indices =
                state.get_attesting_indices(&attestation.data, &attestation.aggregation_bits)?;
            for index in attesting_indices {
                cache
                    .statuses
                    .get_mut(index as usize)
                    .ok_or(BeaconStateError::UnknownValidator(index))?
                    .set(flags);
            }
        }
        Ok(())
    }

    fn compute_rewards(
        state: &BeaconState,
        cache: &EpochProcessCache,
    ) -> Result<Vec<u64>, EpochProcessingError> {
        let mut deltas = cache
            .statuses
            .par_iter()
            .zip(state.validators.par_iter())
            .map(|(status, validator)| {
                Self::validator_delta(status, validator.effective_balance, cache)
            })
            .collect::<Result<Vec<Delta>, BeaconStateError>>()?;

        // Proposer and inclusion delay micro-rewards
        for (index, (status, validator)) in
            cache.statuses.iter().zip(state.validators.iter()).enumerate()
        {
            let Some(proposer_index) = status.proposer_index else {
                continue;
            };
            if !status.is_unslashed_and(PREVIOUS_EPOCH_SOURCE) {
                continue;
            }
            let base_reward = Self::get_base_reward(validator.effective_balance, cache);
            let proposer_reward = base_reward / PROPOSER_REWARD_QUOTIENT;
            deltas
                .get_mut(proposer_index as usize)
                .ok_or(BeaconStateError::UnknownValidator(proposer_index))?
                .reward(proposer_reward)?;
            let max_attester_reward = base_reward - proposer_reward;
            let attester_reward = max_attester_reward
                .checked_div(status.inclusion_delay)
                .ok_or(BeaconStateError::ArithmeticOverflow("inclusion delay"))?;
            deltas[index].reward(attester_reward)?;
        }

        deltas
            .par_iter()
            .zip(state.balances.par_iter())
            .map(|(delta, balance)| -> Result<u64, EpochProcessingError> {
                Ok(balance
                    .checked_add(delta.reward)
                    .ok_or(BeaconStateError::ArithmeticOverflow("balance"))?
                    .saturating_sub(delta.penalty))
            })
            .collect()
    }

    fn proportional_slashing_multiplier() -> u64 {
        PROPORTIONAL_SLASHING_MULTIPLIER
    }

    fn rotate_participation(state: &mut BeaconState) -> Result<(), EpochProcessingError> {
        let pending = state.pending_attestations_mut()?;
        pending.previous_epoch_attestations = mem::take(&mut pending.current_epoch_attestations);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ream_consensus_misc::{
        attestation_data::AttestationData,
        checkpoint::Checkpoint,
        constants::{MAX_EFFECTIVE_BALANCE, SLOTS_PER_EPOCH},
    };
    use ream_network_spec::networks::initialize_test_network_spec;
    use ssz_types::BitList;

    use super::*;
    use crate::genesis::{interop_genesis_state, interop_secret_keys};

    fn state_at_end_of_epoch(epoch: u64) -> BeaconState {
        initialize_test_network_spec();
        let mut state = interop_genesis_state(&interop_secret_keys(4), ForkName::Phase0)
            .expect("genesis should build");
        state.slot = epoch * SLOTS_PER_EPOCH + SLOTS_PER_EPOCH - 1;
        state
    }

    /// One pending attestation per past slot of ``epoch`` with every committee member
    /// participating.
    fn full_participation(state: &BeaconState, epoch: u64) -> Vec<PendingAttestation> {
        (epoch * SLOTS_PER_EPOCH..(epoch + 1) * SLOTS_PER_EPOCH)
            .filter(|slot| *slot < state.slot)
            .map(|slot| {
                let committee = state.get_beacon_committee(slot, 0).unwrap();
                let mut aggregation_bits = BitList::with_capacity(committee.len()).unwrap();
                for i in 0..committee.len() {
                    aggregation_bits.set(i, true).unwrap();
                }
                PendingAttestation {
                    aggregation_bits,
                    data: AttestationData {
                        slot,
                        index: 0,
                        beacon_block_root: state.get_block_root_at_slot(slot).unwrap(),
                        source: state.previous_justified_checkpoint,
                        target: Checkpoint {
                            epoch,
                            root: state.get_block_root(epoch).unwrap(),
                        },
                    },
                    inclusion_delay: 1,
                    proposer_index: 0,
                }
            })
            .collect()
    }

    #[test]
    fn test_missing_votes_are_penalized() {
        let state = state_at_end_of_epoch(3);
        let cache = EpochProcessCache::new(&state).unwrap();
        assert!(!cache.is_in_inactivity_leak);

        let balances = Phase0::compute_rewards(&state, &cache).unwrap();
        let base_reward = Phase0::get_base_reward(MAX_EFFECTIVE_BALANCE, &cache);
        assert!(
            balances
                .iter()
                .all(|balance| *balance == MAX_EFFECTIVE_BALANCE - 3 * base_reward)
        );
    }

    #[test]
    fn test_full_participation_rewards() {
        let mut state = state_at_end_of_epoch(3);
        let attestations = full_participation(&state, 2);
        state.pending_attestations_mut().unwrap().previous_epoch_attestations =
            attestations.into();

        let cache = EpochProcessCache::new(&state).unwrap();
        assert!(cache.statuses.iter().all(|status| status.has(
            PREVIOUS_EPOCH_SOURCE | PREVIOUS_EPOCH_TARGET | PREVIOUS_EPOCH_HEAD
        ) && status.inclusion_delay == 1));
        assert_eq!(cache.previous_epoch_target_increments, 4 * 32);

        let balances = Phase0::compute_rewards(&state, &cache).unwrap();
        let base_reward = Phase0::get_base_reward(MAX_EFFECTIVE_BALANCE, &cache);
        let proposer_reward = base_reward / PROPOSER_REWARD_QUOTIENT;
        let attester = MAX_EFFECTIVE_BALANCE + 3 * base_reward + base_reward - proposer_reward;
        assert_eq!(balances[0], attester + 4 * proposer_reward);
        assert_eq!(&balances[1..], &[attester; 3]);
    }

    #[test]
    fn test_leak_penalizes_non_target() {
        let mut state = state_at_end_of_epoch(10);
        state.validators[3].slashed = true;
        let cache = EpochProcessCache::new(&state).unwrap();
        assert!(cache.is_in_inactivity_leak);
        let base_reward = Phase0::get_base_reward(MAX_EFFECTIVE_BALANCE, &cache);

        let balances = Phase0::compute_rewards(&state, &cache).unwrap();
        let penalty = 3 * base_reward + BASE_REWARDS_PER_EPOCH * base_reward
            - base_reward / PROPOSER_REWARD_QUOTIENT
            + MAX_EFFECTIVE_BALANCE * cache.finality_delay / INACTIVITY_PENALTY_QUOTIENT;
        assert!(balances.iter().all(|balance| *balance == MAX_EFFECTIVE_BALANCE - penalty));
    }

    #[test]
    fn test_rotation_moves_current_to_previous() {
        let mut state = state_at_end_of_epoch(3);
        let attestations = full_participation(&state, 3);
        state.pending_attestations_mut().unwrap().current_epoch_attestations =
            attestations.clone().into();

        Phase0::rotate_participation(&mut state).unwrap();
        let pending = state.pending_attestations().unwrap();
        assert_eq!(pending.previous_epoch_attestations.to_vec(), attestations);
        assert!(pending.current_epoch_attestations.is_empty());
    }
}
