use std::sync::{Arc, LazyLock, Once, OnceLock};

use alloy_primitives::{aliases::B32, fixed_bytes};
use ream_consensus_misc::{constants::SLOTS_PER_EPOCH, fork::Fork, misc::compute_epoch_at_slot};
use serde::Deserialize;

use crate::fork_name::ForkName;

pub static HAS_NETWORK_SPEC_BEEN_INITIALIZED: Once = Once::new();

/// Installs [DEV] as the process-wide spec unless one has already been installed.
pub fn initialize_test_network_spec() {
    HAS_NETWORK_SPEC_BEEN_INITIALIZED.call_once(|| {
        let _ = BEACON_NETWORK_SPEC.set(DEV.clone());
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Dev,
    Custom(String),
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match String::deserialize(deserializer)?.as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "dev" => Ok(Network::Dev),
            custom => Ok(Network::Custom(custom.to_string())),
        }
    }
}

static BEACON_NETWORK_SPEC: OnceLock<Arc<BeaconNetworkSpec>> = OnceLock::new();

/// MUST be called only once at the start of the application to initialize static
/// [BeaconNetworkSpec].
///
/// The static `BeaconNetworkSpec` can be accessed using [beacon_network_spec].
///
/// # Panics
///
/// Panics if this function is called more than once.
pub fn set_beacon_network_spec(network_spec: Arc<BeaconNetworkSpec>) {
    BEACON_NETWORK_SPEC
        .set(network_spec)
        .expect("BeaconNetworkSpec should be set only once at the start of the application");
}

/// Returns the static [BeaconNetworkSpec] initialized by [set_beacon_network_spec].
///
/// # Panics
///
/// Panics if [set_beacon_network_spec] wasn't called before this function.
pub fn beacon_network_spec() -> Arc<BeaconNetworkSpec> {
    BEACON_NETWORK_SPEC
        .get()
        .expect("BeaconNetworkSpec wasn't set")
        .clone()
}

/// Runtime configuration of a network. Keys follow the upper-case names of the consensus
/// `config.yaml`; keys not listed here are ignored.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct BeaconNetworkSpec {
    pub preset_base: String,
    #[serde(rename = "CONFIG_NAME")]
    pub network: Network,

    // Genesis
    pub min_genesis_time: u64,
    pub genesis_fork_version: B32,

    // Forking
    pub altair_fork_version: B32,
    pub altair_fork_epoch: u64,

    // Time parameters
    pub seconds_per_slot: u64,
    pub min_validator_withdrawability_delay: u64,
    pub shard_committee_period: u64,

    // Validator cycle
    pub inactivity_score_bias: u64,
    pub inactivity_score_recovery_rate: u64,
    pub ejection_balance: u64,
    pub min_per_epoch_churn_limit: u64,
    pub churn_limit_quotient: u64,
}

impl BeaconNetworkSpec {
    pub fn fork_name_at_epoch(&self, epoch: u64) -> ForkName {
        if epoch >= self.altair_fork_epoch {
            ForkName::Altair
        } else {
            ForkName::Phase0
        }
    }

    pub fn fork_name_at_slot(&self, slot: u64) -> ForkName {
        self.fork_name_at_epoch(compute_epoch_at_slot(slot))
    }

    pub fn fork_version(&self, fork_name: ForkName) -> B32 {
        match fork_name {
            ForkName::Phase0 => self.genesis_fork_version,
            ForkName::Altair => self.altair_fork_version,
        }
    }

    /// The `Fork` a state carries while `epoch` is its current epoch.
    pub fn fork_at_epoch(&self, epoch: u64) -> Fork {
        match self.fork_name_at_epoch(epoch) {
            ForkName::Phase0 => Fork {
                previous_version: self.genesis_fork_version,
                current_version: self.genesis_fork_version,
                epoch: 0,
            },
            ForkName::Altair => Fork {
                previous_version: self.genesis_fork_version,
                current_version: self.altair_fork_version,
                epoch: self.altair_fork_epoch,
            },
        }
    }

    /// Returns true if `slot` is the first slot of the altair fork epoch.
    pub fn is_altair_upgrade_slot(&self, slot: u64) -> bool {
        slot % SLOTS_PER_EPOCH == 0
            && compute_epoch_at_slot(slot) == self.altair_fork_epoch
    }
}

pub static MAINNET: LazyLock<Arc<BeaconNetworkSpec>> = LazyLock::new(|| {
    BeaconNetworkSpec {
        preset_base: "mainnet".to_string(),
        network: Network::Mainnet,
        min_genesis_time: 1606824000,
        genesis_fork_version: fixed_bytes!("0x00000000"),
        altair_fork_version: fixed_bytes!("0x01000000"),
        altair_fork_epoch: 74240,
        seconds_per_slot: 12,
        min_validator_withdrawability_delay: 256,
        shard_committee_period: 256,
        inactivity_score_bias: 4,
        inactivity_score_recovery_rate: 16,
        ejection_balance: 16000000000,
        min_per_epoch_churn_limit: 4,
        churn_limit_quotient: 65536,
    }
    .into()
});

/// Mainnet parameters with altair scheduled two epochs after genesis.
pub static DEV: LazyLock<Arc<BeaconNetworkSpec>> = LazyLock::new(|| {
    BeaconNetworkSpec {
        preset_base: "mainnet".to_string(),
        network: Network::Dev,
        min_genesis_time: 1606824000,
        genesis_fork_version: fixed_bytes!("0x00000001"),
        altair_fork_version: fixed_bytes!("0x01000001"),
        altair_fork_epoch: 2,
        seconds_per_slot: 12,
        min_validator_withdrawability_delay: 256,
        shard_committee_period: 256,
        inactivity_score_bias: 4,
        inactivity_score_recovery_rate: 16,
        ejection_balance: 16000000000,
        min_per_epoch_churn_limit: 4,
        churn_limit_quotient: 65536,
    }
    .into()
});

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, ForkName::Phase0)]
    #[case(1, ForkName::Phase0)]
    #[case(2, ForkName::Altair)]
    #[case(1000, ForkName::Altair)]
    fn test_dev_fork_schedule(#[case] epoch: u64, #[case] expected: ForkName) {
        assert_eq!(DEV.fork_name_at_epoch(epoch), expected);
        assert_eq!(DEV.fork_at_epoch(epoch).current_version, DEV.fork_version(expected));
    }

    #[test]
    fn test_upgrade_slot() {
        assert!(DEV.is_altair_upgrade_slot(64));
        assert!(!DEV.is_altair_upgrade_slot(65));
        assert!(!DEV.is_altair_upgrade_slot(96));
        assert_eq!(MAINNET.fork_name_at_slot(74240 * 32 - 1), ForkName::Phase0);
        assert_eq!(MAINNET.fork_name_at_slot(74240 * 32), ForkName::Altair);
    }

    #[test]
    fn test_initialize_test_network_spec_is_idempotent() {
        initialize_test_network_spec();
        initialize_test_network_spec();
        assert_eq!(beacon_network_spec().network, Network::Dev);
    }
}
