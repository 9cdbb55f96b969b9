use std::cmp::max;

use ream_consensus_misc::{
    constants::{
        EPOCHS_PER_SLASHINGS_VECTOR, FAR_FUTURE_EPOCH, MIN_SLASHING_PENALTY_QUOTIENT,
        MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR, PROPOSER_REWARD_QUOTIENT, PROPOSER_WEIGHT,
        WEIGHT_DENOMINATOR, WHISTLEBLOWER_REWARD_QUOTIENT,
    },
    misc::compute_activation_exit_epoch,
};
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};
use tracing::debug;

use crate::{beacon_state::BeaconState, errors::BeaconStateError};

impl BeaconState {
    /// Increase the validator balance at index ``index`` by ``delta``.
    pub fn increase_balance(&mut self, index: u64, delta: u64) -> Result<(), BeaconStateError> {
        let balance = self
            .balances
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))?;
        *balance = balance
            .checked_add(delta)
            .ok_or(BeaconStateError::BalanceOverflow(index))?;
        Ok(())
    }

    /// Decrease the validator balance at index ``index`` by ``delta``, with underflow protection.
    pub fn decrease_balance(&mut self, index: u64, delta: u64) -> Result<(), BeaconStateError> {
        let balance = self
            .balances
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))?;
        *balance = balance.saturating_sub(delta);
        Ok(())
    }

    /// Initiate the exit of the validator with index ``index``.
    pub fn initiate_validator_exit(&mut self, index: u64) -> Result<(), BeaconStateError> {
        // Return if validator already initiated exit
        if self.validator(index)?.exit_epoch != FAR_FUTURE_EPOCH {
            return Ok(());
        }

        // Compute exit queue epoch
        let mut exit_queue_epoch = self
            .validators
            .iter()
            .map(|validator| validator.exit_epoch)
            .filter(|exit_epoch| *exit_epoch != FAR_FUTURE_EPOCH)
            .fold(
                compute_activation_exit_epoch(self.get_current_epoch()),
                max,
            );
        let exit_queue_churn = self
            .validators
            .iter()
            .filter(|validator| validator.exit_epoch == exit_queue_epoch)
            .count() as u64;
        if exit_queue_churn >= self.get_validator_churn_limit() {
            exit_queue_epoch += 1;
        }

        // Set validator exit epoch and withdrawable epoch
        let withdrawability_delay = beacon_network_spec().min_validator_withdrawability_delay;
        let validator = self.validator_mut(index)?;
        validator.exit_epoch = exit_queue_epoch;
        validator.withdrawable_epoch = exit_queue_epoch
            .checked_add(withdrawability_delay)
            .ok_or(BeaconStateError::ArithmeticOverflow("withdrawable epoch"))?;
        debug!(index, exit_queue_epoch, "initiated validator exit");
        Ok(())
    }

    /// Slash the validator with index ``slashed_index``. Without a whistleblower the block
    /// proposer collects the whole whistleblower reward.
    pub fn slash_validator(
        &mut self,
        slashed_index: u64,
        whistleblower_index: Option<u64>,
    ) -> Result<(), BeaconStateError> {
        let epoch = self.get_current_epoch();
        self.initiate_validator_exit(slashed_index)?;

        let validator = self.validator_mut(slashed_index)?;
        validator.slashed = true;
        validator.withdrawable_epoch = max(
            validator.withdrawable_epoch,
            epoch + EPOCHS_PER_SLASHINGS_VECTOR,
        );
        let effective_balance = validator.effective_balance;

        let slashings_index = (epoch % EPOCHS_PER_SLASHINGS_VECTOR) as usize;
        self.slashings[slashings_index] = self.slashings[slashings_index]
            .checked_add(effective_balance)
            .ok_or(BeaconStateError::ArithmeticOverflow("slashings"))?;

        let fork_name = self.fork_name();
        let penalty_quotient = match fork_name {
            ForkName::Phase0 => MIN_SLASHING_PENALTY_QUOTIENT,
            ForkName::Altair => MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR,
        };
        self.decrease_balance(slashed_index, effective_balance / penalty_quotient)?;

        // Apply proposer and whistleblower rewards
        let proposer_index = self.get_beacon_proposer_index()?;
        let whistleblower_index = whistleblower_index.unwrap_or(proposer_index);
        let whistleblower_reward = effective_balance / WHISTLEBLOWER_REWARD_QUOTIENT;
        let proposer_reward = match fork_name {
            ForkName::Phase0 => whistleblower_reward / PROPOSER_REWARD_QUOTIENT,
            ForkName::Altair => whistleblower_reward * PROPOSER_WEIGHT / WEIGHT_DENOMINATOR,
        };
        self.increase_balance(proposer_index, proposer_reward)?;
        self.increase_balance(whistleblower_index, whistleblower_reward - proposer_reward)?;

        debug!(
            slashed_index,
            proposer_index, whistleblower_index, "slashed validator"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ream_consensus_misc::constants::{MAX_EFFECTIVE_BALANCE, SLOTS_PER_EPOCH};
    use ream_network_spec::networks::initialize_test_network_spec;

    use super::*;
    use crate::genesis::{interop_secret_keys, interop_genesis_state};

    fn genesis(count: usize, fork_name: ForkName) -> BeaconState {
        initialize_test_network_spec();
        interop_genesis_state(&interop_secret_keys(count), fork_name)
            .expect("genesis should build")
    }

    #[test]
    fn test_balance_bounds() {
        let mut state = genesis(2, ForkName::Phase0);
        state.decrease_balance(0, u64::MAX).unwrap();
        assert_eq!(state.balances[0], 0);

        state.balances[1] = u64::MAX;
        assert_eq!(
            state.increase_balance(1, 1),
            Err(BeaconStateError::BalanceOverflow(1))
        );
        assert_eq!(
            state.increase_balance(2, 1),
            Err(BeaconStateError::UnknownValidator(2))
        );
    }

    #[test]
    fn test_exit_is_idempotent() {
        let mut state = genesis(4, ForkName::Phase0);
        state.initiate_validator_exit(1).unwrap();
        let exit_epoch = state.validators[1].exit_epoch;
        assert_eq!(exit_epoch, compute_activation_exit_epoch(0));
        assert_eq!(
            state.validators[1].withdrawable_epoch,
            exit_epoch + beacon_network_spec().min_validator_withdrawability_delay
        );

        state.slot = 10 * SLOTS_PER_EPOCH;
        state.initiate_validator_exit(1).unwrap();
        assert_eq!(state.validators[1].exit_epoch, exit_epoch);
    }

    #[test]
    fn test_exit_queue_respects_churn() {
        let mut state = genesis(8, ForkName::Phase0);
        let churn_limit = state.get_validator_churn_limit();
        for index in 0..=churn_limit {
            state.initiate_validator_exit(index).unwrap();
        }
        let first = compute_activation_exit_epoch(0);
        let per_epoch = |epoch| {
            state
                .validators
                .iter()
                .filter(|validator| validator.exit_epoch == epoch)
                .count() as u64
        };
        assert_eq!(per_epoch(first), churn_limit);
        assert_eq!(per_epoch(first + 1), 1);
    }

    #[test]
    fn test_slash_validator_phase0() {
        let mut state = genesis(8, ForkName::Phase0);
        let proposer = state.get_beacon_proposer_index().unwrap();
        let slashed = (proposer + 1) % 8;
        let before = state.balances.clone();

        state.slash_validator(slashed, None).unwrap();

        let validator = &state.validators[slashed as usize];
        assert!(validator.slashed);
        assert_eq!(validator.withdrawable_epoch, EPOCHS_PER_SLASHINGS_VECTOR);
        assert_eq!(state.slashings[0], MAX_EFFECTIVE_BALANCE);
        assert_eq!(
            state.balances[slashed as usize],
            before[slashed as usize] - MAX_EFFECTIVE_BALANCE / MIN_SLASHING_PENALTY_QUOTIENT
        );
        assert_eq!(
            state.balances[proposer as usize],
            before[proposer as usize] + MAX_EFFECTIVE_BALANCE / WHISTLEBLOWER_REWARD_QUOTIENT
        );
    }

    #[test]
    fn test_slash_validator_altair_splits_reward() {
        let mut state = genesis(8, ForkName::Altair);
        let proposer = state.get_beacon_proposer_index().unwrap();
        let slashed = (proposer + 1) % 8;
        let whistleblower = (proposer + 2) % 8;
        let before = state.balances.clone();

        state.slash_validator(slashed, Some(whistleblower)).unwrap();

        let reward = MAX_EFFECTIVE_BALANCE / WHISTLEBLOWER_REWARD_QUOTIENT;
        let proposer_reward = reward * PROPOSER_WEIGHT / WEIGHT_DENOMINATOR;
        assert_eq!(
            state.balances[slashed as usize],
            before[slashed as usize]
                - MAX_EFFECTIVE_BALANCE / MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR
        );
        assert_eq!(
            state.balances[proposer as usize],
            before[proposer as usize] + proposer_reward
        );
        assert_eq!(
            state.balances[whistleblower as usize],
            before[whistleblower as usize] + reward - proposer_reward
        );
    }
}
