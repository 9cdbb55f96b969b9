use std::{cmp::max, collections::HashMap, sync::Arc};

use alloy_primitives::{B256, aliases::B32};
use ethereum_hashing::{hash, hash_fixed};
use itertools::Itertools;
use ream_bls::{AggregatePubKey, PubKey};
use ream_consensus_misc::{
    attestation_data::AttestationData,
    beacon_block_header::BeaconBlockHeader,
    checkpoint::Checkpoint,
    constants::{
        BASE_REWARD_FACTOR, DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, DOMAIN_SYNC_COMMITTEE,
        EFFECTIVE_BALANCE_INCREMENT, EPOCHS_PER_HISTORICAL_VECTOR, GENESIS_EPOCH,
        MAX_COMMITTEES_PER_SLOT, MAX_EFFECTIVE_BALANCE, MAX_RANDOM_BYTE, MIN_SEED_LOOKAHEAD,
        SLOTS_PER_EPOCH, SLOTS_PER_HISTORICAL_ROOT, SYNC_COMMITTEE_SIZE, TARGET_COMMITTEE_SIZE,
    },
    eth_1_data::Eth1Data,
    fork::Fork,
    indexed_attestation::IndexedAttestation,
    misc::{
        compute_committee, compute_domain, compute_epoch_at_slot, compute_shuffled_index,
        compute_start_slot_at_epoch, integer_squareroot,
    },
    sync_committee::SyncCommittee,
    validator::Validator,
};
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};
use serde::{Deserialize, Serialize};
use ssz_types::{
    BitList, BitVector, FixedVector, VariableList,
    serde_utils::{quoted_u64_fixed_vec, quoted_u64_var_list},
    typenum::{U4, U2048, U8192, U65536, U16777216, U1099511627776},
};
use tree_hash::{Hash256, PackedEncoding, TreeHash, TreeHashType};

use crate::{
    attestation::Attestation,
    errors::BeaconStateError,
    participation::{EpochParticipation, ParticipationFlags, PendingAttestations},
};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BeaconState {
    // Versioning
    #[serde(with = "serde_utils::quoted_u64")]
    pub genesis_time: u64,
    pub genesis_validators_root: B256,
    #[serde(with = "serde_utils::quoted_u64")]
    pub slot: u64,
    pub fork: Fork,

    // History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: FixedVector<B256, U8192>,
    pub state_roots: FixedVector<B256, U8192>,
    pub historical_roots: VariableList<B256, U16777216>,

    // Eth1
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: VariableList<Eth1Data, U2048>,
    #[serde(with = "serde_utils::quoted_u64")]
    pub eth1_deposit_index: u64,

    // Registry
    pub validators: VariableList<Validator, U1099511627776>,
    #[serde(with = "quoted_u64_var_list")]
    pub balances: VariableList<u64, U1099511627776>,

    // Randomness
    pub randao_mixes: FixedVector<B256, U65536>,

    // Slashings
    #[serde(with = "quoted_u64_fixed_vec")]
    pub slashings: FixedVector<u64, U8192>,

    // Participation, inactivity and sync committees
    #[serde(flatten)]
    pub participation: EpochParticipation,

    // Finality
    pub justification_bits: BitVector<U4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl BeaconState {
    /// Roots of every field in container order. Phase0 and altair states differ in the
    /// participation fields and in the fields altair appends.
    fn field_roots(&self) -> Vec<Hash256> {
        let mut roots = vec![
            self.genesis_time.tree_hash_root(),
            self.genesis_validators_root.tree_hash_root(),
            self.slot.tree_hash_root(),
            self.fork.tree_hash_root(),
            self.latest_block_header.tree_hash_root(),
            self.block_roots.tree_hash_root(),
            self.state_roots.tree_hash_root(),
            self.historical_roots.tree_hash_root(),
            self.eth1_data.tree_hash_root(),
            self.eth1_data_votes.tree_hash_root(),
            self.eth1_deposit_index.tree_hash_root(),
            self.validators.tree_hash_root(),
            self.balances.tree_hash_root(),
            self.randao_mixes.tree_hash_root(),
            self.slashings.tree_hash_root(),
        ];
        match &self.participation {
            EpochParticipation::Phase0(pending) => {
                roots.push(pending.previous_epoch_attestations.tree_hash_root());
                roots.push(pending.current_epoch_attestations.tree_hash_root());
            }
            EpochParticipation::Altair(flags) => {
                roots.push(flags.previous_epoch_participation.tree_hash_root());
                roots.push(flags.current_epoch_participation.tree_hash_root());
            }
        }
        roots.extend([
            self.justification_bits.tree_hash_root(),
            self.previous_justified_checkpoint.tree_hash_root(),
            self.current_justified_checkpoint.tree_hash_root(),
            self.finalized_checkpoint.tree_hash_root(),
        ]);
        if let EpochParticipation::Altair(flags) = &self.participation {
            roots.extend([
                flags.inactivity_scores.tree_hash_root(),
                flags.current_sync_committee.tree_hash_root(),
                flags.next_sync_committee.tree_hash_root(),
            ]);
        }
        roots
    }
}

impl TreeHash for BeaconState {
    fn tree_hash_type() -> TreeHashType {
        TreeHashType::Container
    }

    fn tree_hash_packed_encoding(&self) -> PackedEncoding {
        unreachable!("Container should never be packed.")
    }

    fn tree_hash_packing_factor() -> usize {
        unreachable!("Container should never be packed.")
    }

    fn tree_hash_root(&self) -> Hash256 {
        let leaves = self
            .field_roots()
            .iter()
            .flat_map(|root| root.0)
            .collect::<Vec<u8>>();
        tree_hash::merkle_root(&leaves, 0)
    }
}

impl BeaconState {
    pub fn fork_name(&self) -> ForkName {
        self.participation.fork_name()
    }

    /// Fails if the bookkeeping variant of the state disagrees with the fork schedule at its slot.
    pub fn ensure_fork_consistency(&self) -> Result<(), BeaconStateError> {
        let expected = beacon_network_spec().fork_name_at_slot(self.slot);
        let found = self.fork_name();
        if expected != found {
            return Err(BeaconStateError::IncorrectStateVariant {
                slot: self.slot,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn incorrect_variant(&self, expected: ForkName) -> BeaconStateError {
        BeaconStateError::IncorrectStateVariant {
            slot: self.slot,
            expected,
            found: self.fork_name(),
        }
    }

    pub fn pending_attestations(&self) -> Result<&PendingAttestations, BeaconStateError> {
        match &self.participation {
            EpochParticipation::Phase0(pending) => Ok(pending),
            EpochParticipation::Altair(_) => Err(self.incorrect_variant(ForkName::Phase0)),
        }
    }

    pub fn pending_attestations_mut(
        &mut self,
    ) -> Result<&mut PendingAttestations, BeaconStateError> {
        let slot = self.slot;
        match &mut self.participation {
            EpochParticipation::Phase0(pending) => Ok(pending),
            EpochParticipation::Altair(_) => Err(BeaconStateError::IncorrectStateVariant {
                slot,
                expected: ForkName::Phase0,
                found: ForkName::Altair,
            }),
        }
    }

    pub fn participation_flags(&self) -> Result<&ParticipationFlags, BeaconStateError> {
        match &self.participation {
            EpochParticipation::Altair(flags) => Ok(flags),
            EpochParticipation::Phase0(_) => Err(self.incorrect_variant(ForkName::Altair)),
        }
    }

    pub fn participation_flags_mut(&mut self) -> Result<&mut ParticipationFlags, BeaconStateError> {
        let slot = self.slot;
        match &mut self.participation {
            EpochParticipation::Altair(flags) => Ok(flags),
            EpochParticipation::Phase0(_) => Err(BeaconStateError::IncorrectStateVariant {
                slot,
                expected: ForkName::Altair,
                found: ForkName::Phase0,
            }),
        }
    }

    pub fn validator(&self, index: u64) -> Result<&Validator, BeaconStateError> {
        self.validators
            .get(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))
    }

    pub fn validator_mut(&mut self, index: u64) -> Result<&mut Validator, BeaconStateError> {
        self.validators
            .get_mut(index as usize)
            .ok_or(BeaconStateError::UnknownValidator(index))
    }

    /// Return the current epoch.
    pub fn get_current_epoch(&self) -> u64 {
        compute_epoch_at_slot(self.slot)
    }

    /// Return the previous epoch (unless the current epoch is ``GENESIS_EPOCH``).
    pub fn get_previous_epoch(&self) -> u64 {
        let current_epoch = self.get_current_epoch();
        if current_epoch == GENESIS_EPOCH {
            GENESIS_EPOCH
        } else {
            current_epoch - 1
        }
    }

    /// Return the block root at the start of a recent ``epoch``.
    pub fn get_block_root(&self, epoch: u64) -> Result<B256, BeaconStateError> {
        self.get_block_root_at_slot(compute_start_slot_at_epoch(epoch))
    }

    /// Return the block root at a recent ``slot``.
    pub fn get_block_root_at_slot(&self, slot: u64) -> Result<B256, BeaconStateError> {
        if !(slot < self.slot && self.slot <= slot + SLOTS_PER_HISTORICAL_ROOT) {
            return Err(BeaconStateError::SlotOutOfBounds {
                slot,
                state_slot: self.slot,
            });
        }
        Ok(self.block_roots[(slot % SLOTS_PER_HISTORICAL_ROOT) as usize])
    }

    /// Return the randao mix at a recent ``epoch``.
    pub fn get_randao_mix(&self, epoch: u64) -> B256 {
        self.randao_mixes[(epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize]
    }

    /// Return the sequence of active validator indices at ``epoch``.
    pub fn get_active_validator_indices(&self, epoch: u64) -> Vec<u64> {
        self.validators
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_active_validator(epoch).then_some(i as u64))
            .collect()
    }

    /// Churn limit for an epoch with ``active_validator_count`` active validators.
    pub fn churn_limit_for(active_validator_count: u64) -> u64 {
        let network_spec = beacon_network_spec();
        max(
            network_spec.min_per_epoch_churn_limit,
            active_validator_count / network_spec.churn_limit_quotient,
        )
    }

    /// Return the validator churn limit for the current epoch.
    pub fn get_validator_churn_limit(&self) -> u64 {
        Self::churn_limit_for(
            self.get_active_validator_indices(self.get_current_epoch())
                .len() as u64,
        )
    }

    /// Return the seed at ``epoch``.
    pub fn get_seed(&self, epoch: u64, domain_type: B32) -> B256 {
        let mix =
            self.get_randao_mix(epoch + EPOCHS_PER_HISTORICAL_VECTOR - MIN_SEED_LOOKAHEAD - 1);
        let epoch_with_index =
            [domain_type.as_slice(), &epoch.to_le_bytes(), mix.as_slice()].concat();
        B256::from(hash_fixed(&epoch_with_index))
    }

    /// Return the number of committees in each slot for the given ``epoch``.
    pub fn get_committee_count_per_slot(&self, epoch: u64) -> u64 {
        (self.get_active_validator_indices(epoch).len() as u64
            / SLOTS_PER_EPOCH
            / TARGET_COMMITTEE_SIZE)
            .clamp(1, MAX_COMMITTEES_PER_SLOT)
    }

    /// Sample from ``indices`` by effective balance. Each accepted candidate is drawn with
    /// probability proportional to its effective balance using one random byte per draw.
    fn sample_by_effective_balance(
        &self,
        indices: &[u64],
        seed: B256,
        count: usize,
    ) -> Result<Vec<u64>, BeaconStateError> {
        let total = indices.len();
        let mut selected = Vec::with_capacity(count);
        let mut i: usize = 0;
        while selected.len() < count {
            let candidate_index = indices[compute_shuffled_index(i % total, total, seed)?];
            let random_byte = hash(&[seed.as_slice(), &((i / 32) as u64).to_le_bytes()].concat())
                [i % 32] as u64;
            let effective_balance = self.validator(candidate_index)?.effective_balance;
            if effective_balance * MAX_RANDOM_BYTE >= MAX_EFFECTIVE_BALANCE * random_byte {
                selected.push(candidate_index);
            }
            i += 1;
        }
        Ok(selected)
    }

    /// Return from ``indices`` a random index sampled by effective balance.
    pub fn compute_proposer_index(
        &self,
        indices: &[u64],
        seed: B256,
    ) -> Result<u64, BeaconStateError> {
        if indices.is_empty() {
            return Err(BeaconStateError::NoActiveValidators(
                self.get_current_epoch(),
            ));
        }
        let selected = self.sample_by_effective_balance(indices, seed, 1)?;
        Ok(selected[0])
    }

    /// Return the beacon proposer index at the current slot.
    pub fn get_beacon_proposer_index(&self) -> Result<u64, BeaconStateError> {
        let epoch = self.get_current_epoch();
        let seed = B256::from(hash_fixed(
            &[
                self.get_seed(epoch, DOMAIN_BEACON_PROPOSER).as_slice(),
                &self.slot.to_le_bytes(),
            ]
            .concat(),
        ));
        let indices = self.get_active_validator_indices(epoch);
        self.compute_proposer_index(&indices, seed)
    }

    /// Return the combined effective balance of the ``indices``.
    /// ``EFFECTIVE_BALANCE_INCREMENT`` Gwei minimum to avoid divisions by zero.
    pub fn get_total_balance<'a>(
        &self,
        indices: impl IntoIterator<Item = &'a u64>,
    ) -> Result<u64, BeaconStateError> {
        let mut total: u64 = 0;
        for index in indices {
            total = total
                .checked_add(self.validator(*index)?.effective_balance)
                .ok_or(BeaconStateError::ArithmeticOverflow("total balance"))?;
        }
        Ok(max(EFFECTIVE_BALANCE_INCREMENT, total))
    }

    /// Return the combined effective balance of the active validators.
    pub fn get_total_active_balance(&self) -> Result<u64, BeaconStateError> {
        self.get_total_balance(&self.get_active_validator_indices(self.get_current_epoch()))
    }

    /// Return the signature domain (fork version concatenated with domain type) of a message.
    pub fn get_domain(&self, domain_type: B32, epoch: Option<u64>) -> B256 {
        let epoch = epoch.unwrap_or_else(|| self.get_current_epoch());
        let fork_version = if epoch < self.fork.epoch {
            self.fork.previous_version
        } else {
            self.fork.current_version
        };
        compute_domain(domain_type, fork_version, self.genesis_validators_root)
    }

    /// Return the beacon committee at ``slot`` for ``index``.
    pub fn get_beacon_committee(&self, slot: u64, index: u64) -> Result<Vec<u64>, BeaconStateError> {
        let epoch = compute_epoch_at_slot(slot);
        let committees_per_slot = self.get_committee_count_per_slot(epoch);
        Ok(compute_committee(
            &self.get_active_validator_indices(epoch),
            self.get_seed(epoch, DOMAIN_BEACON_ATTESTER),
            (slot % SLOTS_PER_EPOCH) * committees_per_slot + index,
            committees_per_slot * SLOTS_PER_EPOCH,
        )?)
    }

    /// Return the attesting indices corresponding to ``data`` and ``bits``, in committee order.
    pub fn get_attesting_indices(
        &self,
        data: &AttestationData,
        bits: &BitList<U2048>,
    ) -> Result<Vec<u64>, BeaconStateError> {
        let committee = self.get_beacon_committee(data.slot, data.index)?;
        committee
            .into_iter()
            .enumerate()
            .filter_map(|(i, index)| match bits.get(i) {
                Ok(true) => Some(Ok(index)),
                Ok(false) => None,
                Err(err) => Some(Err(BeaconStateError::Bitfield(format!("{err:?}")))),
            })
            .collect()
    }

    /// Return the indexed attestation corresponding to ``attestation``.
    pub fn get_indexed_attestation(
        &self,
        attestation: &Attestation,
    ) -> Result<IndexedAttestation, BeaconStateError> {
        let attesting_indices = self
            .get_attesting_indices(&attestation.data, &attestation.aggregation_bits)?
            .into_iter()
            .sorted()
            .collect::<Vec<_>>();
        Ok(IndexedAttestation {
            attesting_indices: attesting_indices.into(),
            data: attestation.data.clone(),
            signature: attestation.signature.clone(),
        })
    }

    pub fn get_base_reward_per_increment(&self) -> Result<u64, BeaconStateError> {
        Ok(EFFECTIVE_BALANCE_INCREMENT * BASE_REWARD_FACTOR
            / integer_squareroot(self.get_total_active_balance()?))
    }

    /// Altair base reward of validator ``index``.
    pub fn get_base_reward(
        &self,
        index: u64,
        base_reward_per_increment: u64,
    ) -> Result<u64, BeaconStateError> {
        Ok(self.validator(index)?.effective_balance / EFFECTIVE_BALANCE_INCREMENT
            * base_reward_per_increment)
    }

    /// Map from public key to validator index.
    pub fn pubkey_index_map(&self) -> HashMap<&PubKey, u64> {
        self.validators
            .iter()
            .enumerate()
            .map(|(index, validator)| (&validator.pubkey, index as u64))
            .collect()
    }

    /// Return the sync committee indices, with possible duplicates, sampled from the validators
    /// active in the next epoch.
    pub fn get_next_sync_committee_indices(
        &self,
        active_validator_indices: &[u64],
    ) -> Result<Vec<u64>, BeaconStateError> {
        let epoch = self.get_current_epoch() + 1;
        if active_validator_indices.is_empty() {
            return Err(BeaconStateError::NoActiveValidators(epoch));
        }
        let seed = self.get_seed(epoch, DOMAIN_SYNC_COMMITTEE);
        self.sample_by_effective_balance(
            active_validator_indices,
            seed,
            SYNC_COMMITTEE_SIZE as usize,
        )
    }

    /// Return the next sync committee, with possible pubkey duplicates.
    pub fn get_next_sync_committee(&self) -> Result<Arc<SyncCommittee>, BeaconStateError> {
        self.compute_sync_committee(
            &self.get_active_validator_indices(self.get_current_epoch() + 1),
        )
    }

    pub fn compute_sync_committee(
        &self,
        active_validator_indices: &[u64],
    ) -> Result<Arc<SyncCommittee>, BeaconStateError> {
        let pubkeys = self
            .get_next_sync_committee_indices(active_validator_indices)?
            .into_iter()
            .map(|index| Ok(self.validator(index)?.pubkey.clone()))
            .collect::<Result<Vec<_>, BeaconStateError>>()?;
        let aggregate_pubkey = AggregatePubKey::aggregate(&pubkeys.iter().collect::<Vec<_>>())
            .map_err(|err| BeaconStateError::PubkeyAggregation(err.to_string()))?
            .to_pubkey();
        Ok(Arc::new(SyncCommittee {
            pubkeys: pubkeys.into(),
            aggregate_pubkey,
        }))
    }
}
