use std::sync::Arc;

use ream_consensus_misc::{
    constants::NUM_FLAG_INDICES, pending_attestation::PendingAttestation,
    sync_committee::SyncCommittee,
};
use ream_network_spec::fork_name::ForkName;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz_types::{
    VariableList,
    serde_utils::quoted_u64_var_list,
    typenum::{U4096, U1099511627776},
};

pub type ParticipationList = VariableList<u8, U1099511627776>;

pub mod quoted_u8_var_list {
    use super::*;

    pub fn serialize<S>(value: &ParticipationList, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let string_vec: Vec<String> = value.iter().map(|v| v.to_string()).collect();
        string_vec.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ParticipationList, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string_vec: Vec<String> = Vec::deserialize(deserializer)?;
        let bytes = string_vec
            .into_iter()
            .map(|s| s.parse::<u8>().map_err(serde::de::Error::custom))
            .collect::<Result<Vec<_>, _>>()?;
        VariableList::new(bytes).map_err(|err| {
            serde::de::Error::custom(format!("Cannot create VariableList from bytes: {err:?}"))
        })
    }
}

/// Phase0 bookkeeping: every attestation included on chain, kept for the previous and current
/// epoch.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Default)]
pub struct PendingAttestations {
    pub previous_epoch_attestations: VariableList<PendingAttestation, U4096>,
    pub current_epoch_attestations: VariableList<PendingAttestation, U4096>,
}

/// Altair bookkeeping: one flag byte per validator per epoch, inactivity scores and the sync
/// committees.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ParticipationFlags {
    #[serde(with = "quoted_u8_var_list")]
    pub previous_epoch_participation: ParticipationList,
    #[serde(with = "quoted_u8_var_list")]
    pub current_epoch_participation: ParticipationList,
    #[serde(with = "quoted_u64_var_list")]
    pub inactivity_scores: VariableList<u64, U1099511627776>,
    pub current_sync_committee: Arc<SyncCommittee>,
    pub next_sync_committee: Arc<SyncCommittee>,
}

/// The part of the state whose shape depends on the fork.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpochParticipation {
    Altair(ParticipationFlags),
    Phase0(PendingAttestations),
}

impl EpochParticipation {
    pub fn fork_name(&self) -> ForkName {
        match self {
            EpochParticipation::Phase0(_) => ForkName::Phase0,
            EpochParticipation::Altair(_) => ForkName::Altair,
        }
    }
}

pub fn add_flag(flags: u8, flag_index: u8) -> u8 {
    flags | (1 << flag_index)
}

pub fn has_flag(flags: u8, flag_index: u8) -> bool {
    let flag = 1 << flag_index;
    flags & flag == flag
}

/// All flags a participation byte can carry.
pub const PARTICIPATION_FLAGS_MASK: u8 = (1 << NUM_FLAG_INDICES) - 1;

#[cfg(test)]
mod tests {
    use ream_consensus_misc::constants::{
        TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX,
    };

    use super::*;

    #[test]
    fn test_flags() {
        let flags = add_flag(add_flag(0, TIMELY_SOURCE_FLAG_INDEX), TIMELY_HEAD_FLAG_INDEX);
        assert_eq!(flags, 0b101);
        assert!(has_flag(flags, TIMELY_SOURCE_FLAG_INDEX));
        assert!(!has_flag(flags, TIMELY_TARGET_FLAG_INDEX));
        assert!(has_flag(flags, TIMELY_HEAD_FLAG_INDEX));
        assert_eq!(add_flag(flags, TIMELY_TARGET_FLAG_INDEX), PARTICIPATION_FLAGS_MASK);
    }

    #[test]
    fn test_quoted_participation_serde() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(with = "quoted_u8_var_list")]
            list: ParticipationList,
        }
        let wrapper = Wrapper {
            list: VariableList::from(vec![0, 7, 3]),
        };
        let json = serde_json::to_string(&wrapper).unwrap();
        assert_eq!(json, r#"{"list":["0","7","3"]}"#);
        let decoded: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.list, wrapper.list);
    }
}
