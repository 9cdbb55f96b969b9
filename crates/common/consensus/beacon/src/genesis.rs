//! Deterministic genesis states, as used by interop testnets and tests.

use alloy_primitives::B256;
use ethereum_hashing::hash;
use ream_bls::{PrivateKey, traits::Signable};
use ream_consensus_misc::{
    beacon_block_header::BeaconBlockHeader,
    checkpoint::Checkpoint,
    constants::{
        BLS_WITHDRAWAL_PREFIX, DEPOSIT_CONTRACT_TREE_DEPTH, EPOCHS_PER_HISTORICAL_VECTOR,
        GENESIS_EPOCH, MAX_EFFECTIVE_BALANCE, SLOTS_PER_EPOCH,
    },
    deposit_data::DepositData,
    eth_1_data::Eth1Data,
    validator::Validator,
};
use ream_merkle::DepositDataTree;
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};
use ssz_types::{BitVector, FixedVector, VariableList};
use tracing::debug;
use tree_hash::TreeHash;

use crate::{
    beacon_block::BeaconBlockBody,
    beacon_state::BeaconState,
    errors::BeaconStateError,
    participation::{EpochParticipation, ParticipationFlags, PendingAttestations},
    per_block_processing::signature_sets::deposit_signing_root,
};

/// Block hash of the eth1 block a genesis state is built from.
pub const ETH1_BLOCK_HASH: B256 = B256::repeat_byte(0x42);

/// Keys derived from the hash of each validator index. Key generation only fails for input
/// keying material shorter than 32 bytes, so every index yields a key.
pub fn interop_secret_keys(validator_count: usize) -> Vec<PrivateKey> {
    (0..validator_count as u64)
        .filter_map(|index| PrivateKey::from_ikm(&hash(&index.to_le_bytes())).ok())
        .collect()
}

/// A deposit of ``MAX_EFFECTIVE_BALANCE`` signed by ``key``, withdrawing to a BLS credential of
/// the same key.
pub fn interop_deposit_data(key: &PrivateKey) -> Result<DepositData, BeaconStateError> {
    let pubkey = key
        .public_key()
        .map_err(|err| BeaconStateError::Genesis(format!("{err:?}")))?;
    let mut withdrawal_credentials = B256::from_slice(&hash(pubkey.to_bytes()));
    withdrawal_credentials[..BLS_WITHDRAWAL_PREFIX.len()].copy_from_slice(BLS_WITHDRAWAL_PREFIX);

    let mut deposit_data = DepositData {
        pubkey,
        withdrawal_credentials,
        amount: MAX_EFFECTIVE_BALANCE,
        signature: Default::default(),
    };
    deposit_data.signature = key
        .sign(deposit_signing_root(&deposit_data).as_slice())
        .map_err(|err| BeaconStateError::Genesis(format!("{err:?}")))?;
    Ok(deposit_data)
}

/// Build a state in which every key made one full deposit and all validators are active.
///
/// A phase0 state starts at slot 0; an altair state starts at the first slot of the altair fork
/// epoch with empty participation and freshly computed sync committees.
pub fn interop_genesis_state(
    keys: &[PrivateKey],
    fork_name: ForkName,
) -> Result<BeaconState, BeaconStateError> {
    let network_spec = beacon_network_spec();
    let deposits = keys
        .iter()
        .map(interop_deposit_data)
        .collect::<Result<Vec<_>, _>>()?;

    let leaves = deposits
        .iter()
        .map(|deposit_data| deposit_data.tree_hash_root())
        .collect::<Vec<_>>();
    let deposit_tree = DepositDataTree::create(&leaves, DEPOSIT_CONTRACT_TREE_DEPTH as usize)
        .map_err(|err| BeaconStateError::Genesis(err.to_string()))?;

    let validators = deposits
        .iter()
        .map(|deposit_data| Validator {
            activation_eligibility_epoch: GENESIS_EPOCH,
            activation_epoch: GENESIS_EPOCH,
            ..Validator::from_deposit(
                deposit_data.pubkey.clone(),
                deposit_data.withdrawal_credentials,
                deposit_data.amount,
            )
        })
        .collect::<Vec<_>>();
    let balances = deposits
        .iter()
        .map(|deposit_data| deposit_data.amount)
        .collect::<Vec<_>>();

    let epoch = match fork_name {
        ForkName::Phase0 => GENESIS_EPOCH,
        ForkName::Altair => network_spec.altair_fork_epoch,
    };
    let validators: VariableList<_, _> =
        VariableList::new(validators).map_err(|_| BeaconStateError::ListFull("validators"))?;

    let mut state = BeaconState {
        genesis_time: network_spec.min_genesis_time,
        genesis_validators_root: validators.tree_hash_root(),
        slot: epoch * SLOTS_PER_EPOCH,
        fork: network_spec.fork_at_epoch(epoch),
        latest_block_header: BeaconBlockHeader {
            body_root: BeaconBlockBody::empty(fork_name).tree_hash_root(),
            ..Default::default()
        },
        block_roots: FixedVector::default(),
        state_roots: FixedVector::default(),
        historical_roots: VariableList::default(),
        eth1_data: Eth1Data {
            deposit_root: deposit_tree.root(),
            deposit_count: deposits.len() as u64,
            block_hash: ETH1_BLOCK_HASH,
        },
        eth1_data_votes: VariableList::default(),
        eth1_deposit_index: deposits.len() as u64,
        validators,
        balances: VariableList::new(balances)
            .map_err(|_| BeaconStateError::ListFull("balances"))?,
        randao_mixes: FixedVector::new(vec![
            ETH1_BLOCK_HASH;
            EPOCHS_PER_HISTORICAL_VECTOR as usize
        ])
        .map_err(|err| BeaconStateError::Genesis(format!("{err:?}")))?,
        slashings: FixedVector::default(),
        participation: EpochParticipation::Phase0(PendingAttestations::default()),
        justification_bits: BitVector::new(),
        previous_justified_checkpoint: Checkpoint::default(),
        current_justified_checkpoint: Checkpoint::default(),
        finalized_checkpoint: Checkpoint::default(),
    };

    if fork_name == ForkName::Altair {
        let sync_committee = state.get_next_sync_committee()?;
        let validator_count = state.validators.len();
        state.participation = EpochParticipation::Altair(ParticipationFlags {
            previous_epoch_participation: VariableList::new(vec![0; validator_count])
                .map_err(|_| BeaconStateError::ListFull("previous epoch participation"))?,
            current_epoch_participation: VariableList::new(vec![0; validator_count])
                .map_err(|_| BeaconStateError::ListFull("current epoch participation"))?,
            inactivity_scores: VariableList::new(vec![0; validator_count])
                .map_err(|_| BeaconStateError::ListFull("inactivity scores"))?,
            current_sync_committee: sync_committee.clone(),
            next_sync_committee: sync_committee,
        });
    }

    debug!(
        validators = state.validators.len(),
        slot = state.slot,
        fork = %fork_name,
        "built genesis state"
    );
    Ok(state)
}
