use std::cmp::max;

use ream_consensus_misc::{
    constants::{
        BASE_REWARD_FACTOR, EFFECTIVE_BALANCE_INCREMENT, EPOCHS_PER_SLASHINGS_VECTOR,
        FAR_FUTURE_EPOCH, MIN_EPOCHS_TO_INACTIVITY_PENALTY,
    },
    misc::integer_squareroot,
};
use ream_metrics::{EPOCH_CACHE_BUILD_TIME, start_timer_vec, stop_timer};
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};

use crate::{
    attester_status::{
        AttesterStatus, CURRENT_EPOCH_TARGET, ELIGIBLE_ATTESTER, PREVIOUS_EPOCH_HEAD,
        PREVIOUS_EPOCH_SOURCE, PREVIOUS_EPOCH_TARGET, UNSLASHED,
    },
    beacon_state::BeaconState,
    errors::EpochProcessingError,
    per_epoch_processing::{ForkVariant, altair::Altair, phase0::Phase0},
};

/// Everything the epoch sub-transitions need to know about the registry, computed in one pass
/// before any of them runs and dropped once the epoch is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochProcessCache {
    pub previous_epoch: u64,
    pub current_epoch: u64,
    /// Sum of active effective balances, in increments, at least one.
    pub total_active_increments: u64,
    pub total_active_balance: u64,
    pub sqrt_total_active_balance: u64,
    pub base_reward_per_increment: u64,
    pub finality_delay: u64,
    pub is_in_inactivity_leak: bool,
    pub churn_limit: u64,

    // Unslashed participating stake in increments, each at least one.
    pub previous_epoch_source_increments: u64,
    pub previous_epoch_target_increments: u64,
    pub previous_epoch_head_increments: u64,
    pub current_epoch_target_increments: u64,

    pub indices_to_queue: Vec<u64>,
    /// Sorted by activation eligibility epoch, then index.
    pub indices_eligible_for_activation: Vec<u64>,
    pub indices_to_eject: Vec<u64>,
    pub indices_to_slash: Vec<u64>,
    pub next_epoch_active_indices: Vec<u64>,

    pub statuses: Vec<AttesterStatus>,
    pub is_active_previous_epoch: Vec<bool>,
    pub is_active_next_epoch: Vec<bool>,
}

impl EpochProcessCache {
    /// Build the cache for the variant matching the state's bookkeeping.
    pub fn new(state: &BeaconState) -> Result<Self, EpochProcessingError> {
        match state.fork_name() {
            ForkName::Phase0 => Self::build::<Phase0>(state),
            ForkName::Altair => Self::build::<Altair>(state),
        }
    }

    pub fn build<V: ForkVariant>(state: &BeaconState) -> Result<Self, EpochProcessingError> {
        let timer = start_timer_vec(&EPOCH_CACHE_BUILD_TIME, &[&V::FORK.to_string()]);
        let mut cache = Self::from_registry(state)?;
        V::update_attester_statuses(state, &mut cache)?;
        cache.sum_participating_stake(state);
        stop_timer(timer);
        Ok(cache)
    }

    fn from_registry(state: &BeaconState) -> Result<Self, EpochProcessingError> {
        let current_epoch = state.get_current_epoch();
        let previous_epoch = state.get_previous_epoch();
        let next_epoch = current_epoch + 1;
        let ejection_balance = beacon_network_spec().ejection_balance;
        let validator_count = state.validators.len();

        let mut statuses = Vec::with_capacity(validator_count);
        let mut is_active_previous_epoch = Vec::with_capacity(validator_count);
        let mut is_active_next_epoch = Vec::with_capacity(validator_count);
        let mut next_epoch_active_indices = vec![];
        let mut indices_to_queue = vec![];
        let mut eligible_for_activation = vec![];
        let mut indices_to_eject = vec![];
        let mut indices_to_slash = vec![];
        let mut total_active_increments: u64 = 0;
        let mut active_count: u64 = 0;

        for (index, validator) in state.validators.iter().enumerate() {
            let index = index as u64;
            let active_previous = validator.is_active_validator(previous_epoch);
            let active_current = validator.is_active_validator(current_epoch);
            let active_next = validator.is_active_validator(next_epoch);

            let mut status = AttesterStatus {
                active: active_current,
                ..AttesterStatus::default()
            };
            if !validator.slashed {
                status.set(UNSLASHED);
            }
            if active_previous
                || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
            {
                status.set(ELIGIBLE_ATTESTER);
            }
            if active_current {
                active_count += 1;
                total_active_increments += validator.effective_balance / EFFECTIVE_BALANCE_INCREMENT;
            }
            if validator.slashed
                && current_epoch + EPOCHS_PER_SLASHINGS_VECTOR / 2 == validator.withdrawable_epoch
            {
                indices_to_slash.push(index);
            }

            if validator.is_eligible_for_activation_queue() {
                indices_to_queue.push(index);
            } else if validator.activation_epoch == FAR_FUTURE_EPOCH
                && validator.activation_eligibility_epoch <= current_epoch
            {
                eligible_for_activation.push((validator.activation_eligibility_epoch, index));
            } else if active_current
                && validator.exit_epoch == FAR_FUTURE_EPOCH
                && validator.effective_balance <= ejection_balance
            {
                indices_to_eject.push(index);
            }

            if active_next {
                next_epoch_active_indices.push(index);
            }
            statuses.push(status);
            is_active_previous_epoch.push(active_previous);
            is_active_next_epoch.push(active_next);
        }

        eligible_for_activation.sort_unstable();

        let total_active_increments = max(1, total_active_increments);
        let total_active_balance = total_active_increments
            .checked_mul(EFFECTIVE_BALANCE_INCREMENT)
            .ok_or(EpochProcessingError::TotalActiveBalanceOverflow {
                increments: total_active_increments,
            })?;
        let sqrt_total_active_balance = integer_squareroot(total_active_balance);
        let finality_delay = previous_epoch.saturating_sub(state.finalized_checkpoint.epoch);

        Ok(Self {
            previous_epoch,
            current_epoch,
            total_active_increments,
            total_active_balance,
            sqrt_total_active_balance,
            base_reward_per_increment: EFFECTIVE_BALANCE_INCREMENT * BASE_REWARD_FACTOR
                / sqrt_total_active_balance,
            finality_delay,
            is_in_inactivity_leak: finality_delay > MIN_EPOCHS_TO_INACTIVITY_PENALTY,
            churn_limit: BeaconState::churn_limit_for(active_count),
            previous_epoch_source_increments: 1,
            previous_epoch_target_increments: 1,
            previous_epoch_head_increments: 1,
            current_epoch_target_increments: 1,
            indices_to_queue,
            indices_eligible_for_activation: eligible_for_activation
                .into_iter()
                .map(|(_, index)| index)
                .collect(),
            indices_to_eject,
            indices_to_slash,
            next_epoch_active_indices,
            statuses,
            is_active_previous_epoch,
            is_active_next_epoch,
        })
    }

    fn sum_participating_stake(&mut self, state: &BeaconState) {
        let (mut source, mut target, mut head, mut current_target) = (0, 0, 0, 0);
        for (status, validator) in self.statuses.iter().zip(state.validators.iter()) {
            let increments = validator.effective_balance / EFFECTIVE_BALANCE_INCREMENT;
            if status.is_unslashed_and(PREVIOUS_EPOCH_SOURCE) {
                source += increments;
            }
            if status.is_unslashed_and(PREVIOUS_EPOCH_TARGET) {
                target += increments;
            }
            if status.is_unslashed_and(PREVIOUS_EPOCH_HEAD) {
                head += increments;
            }
            if status.is_unslashed_and(CURRENT_EPOCH_TARGET) {
                current_target += increments;
            }
        }
        self.previous_epoch_source_increments = max(1, source);
        self.previous_epoch_target_increments = max(1, target);
        self.previous_epoch_head_increments = max(1, head);
        self.current_epoch_target_increments = max(1, current_target);
    }

    pub fn previous_epoch_target_balance(&self) -> u64 {
        self.previous_epoch_target_increments * EFFECTIVE_BALANCE_INCREMENT
    }

    pub fn current_epoch_target_balance(&self) -> u64 {
        self.current_epoch_target_increments * EFFECTIVE_BALANCE_INCREMENT
    }

    /// Fails if the status table no longer lines up with the registry.
    pub fn ensure_covers(&self, state: &BeaconState) -> Result<(), EpochProcessingError> {
        if self.statuses.len() != state.validators.len() {
            return Err(EpochProcessingError::ValidatorStatusesInconsistent {
                statuses: self.statuses.len(),
                validators: state.validators.len(),
            });
        }
        Ok(())
    }
}
