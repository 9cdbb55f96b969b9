use alloy_primitives::B256;
use ream_bls::PubKey;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

use crate::constants::{
    EFFECTIVE_BALANCE_INCREMENT, FAR_FUTURE_EPOCH, HYSTERESIS_DOWNWARD_MULTIPLIER,
    HYSTERESIS_QUOTIENT, HYSTERESIS_UPWARD_MULTIPLIER, MAX_EFFECTIVE_BALANCE,
};

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Validator {
    pub pubkey: PubKey,

    /// Commitment to pubkey for withdrawals
    pub withdrawal_credentials: B256,

    /// Balance at stake
    #[serde(with = "serde_utils::quoted_u64")]
    pub effective_balance: u64,
    pub slashed: bool,

    /// When criteria for activation were met
    #[serde(with = "serde_utils::quoted_u64")]
    pub activation_eligibility_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub activation_epoch: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub exit_epoch: u64,

    /// When validator can withdraw funds
    #[serde(with = "serde_utils::quoted_u64")]
    pub withdrawable_epoch: u64,
}

impl Validator {
    /// A freshly deposited validator: nothing scheduled yet.
    pub fn from_deposit(pubkey: PubKey, withdrawal_credentials: B256, amount: u64) -> Self {
        Self {
            pubkey,
            withdrawal_credentials,
            effective_balance: (amount - amount % EFFECTIVE_BALANCE_INCREMENT)
                .min(MAX_EFFECTIVE_BALANCE),
            slashed: false,
            activation_eligibility_epoch: FAR_FUTURE_EPOCH,
            activation_epoch: FAR_FUTURE_EPOCH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        }
    }

    pub fn is_active_validator(&self, epoch: u64) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    pub fn is_slashable_validator(&self, epoch: u64) -> bool {
        !self.slashed && self.activation_epoch <= epoch && epoch < self.withdrawable_epoch
    }

    /// Check if ``validator`` is eligible to be placed into the activation queue.
    pub fn is_eligible_for_activation_queue(&self) -> bool {
        self.activation_eligibility_epoch == FAR_FUTURE_EPOCH
            && self.effective_balance == MAX_EFFECTIVE_BALANCE
    }

    /// Check if ``validator`` is eligible for activation once ``finalized_epoch`` is known.
    pub fn is_eligible_for_activation(&self, finalized_epoch: u64) -> bool {
        self.activation_eligibility_epoch <= finalized_epoch
            && self.activation_epoch == FAR_FUTURE_EPOCH
    }

    /// Apply the hysteresis rule to ``balance``. Returns the new effective balance if it changes.
    pub fn updated_effective_balance(&self, balance: u64) -> Option<u64> {
        let hysteresis_increment = EFFECTIVE_BALANCE_INCREMENT / HYSTERESIS_QUOTIENT;
        let downward_threshold = hysteresis_increment * HYSTERESIS_DOWNWARD_MULTIPLIER;
        let upward_threshold = hysteresis_increment * HYSTERESIS_UPWARD_MULTIPLIER;
        if balance + downward_threshold < self.effective_balance
            || self.effective_balance + upward_threshold < balance
        {
            let effective_balance = (balance - balance % EFFECTIVE_BALANCE_INCREMENT)
                .min(MAX_EFFECTIVE_BALANCE);
            (effective_balance != self.effective_balance).then_some(effective_balance)
        } else {
            None
        }
    }
}
