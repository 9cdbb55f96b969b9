use ream_consensus_misc::constants::{
    EFFECTIVE_BALANCE_INCREMENT, PROPOSER_WEIGHT, SLOTS_PER_EPOCH, SYNC_COMMITTEE_SIZE,
    SYNC_REWARD_WEIGHT, WEIGHT_DENOMINATOR,
};

use super::{VerifySignatures, signature_sets::sync_aggregate_signature_set};
use crate::{
    beacon_state::BeaconState,
    errors::{BlockOperationError, SyncAggregateInvalid},
    sync_aggregate::SyncAggregate,
};

/// Rewards of one sync committee member and of the proposer per included participant.
pub fn compute_sync_aggregate_rewards(
    state: &BeaconState,
) -> Result<(u64, u64), BlockOperationError<SyncAggregateInvalid>> {
    let total_active_increments = state.get_total_active_balance()? / EFFECTIVE_BALANCE_INCREMENT;
    let total_base_rewards = state.get_base_reward_per_increment()? * total_active_increments;
    let max_participant_rewards =
        total_base_rewards * SYNC_REWARD_WEIGHT / WEIGHT_DENOMINATOR / SLOTS_PER_EPOCH;
    let participant_reward = max_participant_rewards / SYNC_COMMITTEE_SIZE;
    let proposer_reward =
        participant_reward * PROPOSER_WEIGHT / (WEIGHT_DENOMINATOR - PROPOSER_WEIGHT);
    Ok((participant_reward, proposer_reward))
}

pub fn process_sync_aggregate(
    state: &mut BeaconState,
    sync_aggregate: &SyncAggregate,
    proposer_index: u64,
    verify_signatures: VerifySignatures,
) -> Result<(), BlockOperationError<SyncAggregateInvalid>> {
    // Verify sync committee aggregate signature signing over the previous slot block root
    if verify_signatures.is_true()
        && let Some(signature_set) =
            sync_aggregate_signature_set(state, sync_aggregate, state.slot)?
        && !signature_set.verify()
    {
        return Err(BlockOperationError::invalid(
            SyncAggregateInvalid::SignatureInvalid,
        ));
    }

    let (participant_reward, proposer_reward) = compute_sync_aggregate_rewards(state)?;

    // Apply participant and proposer rewards
    let committee_indices = {
        let pubkey_index_map = state.pubkey_index_map();
        state
            .participation_flags()?
            .current_sync_committee
            .pubkeys
            .iter()
            .map(|pubkey| pubkey_index_map.get(pubkey).copied())
            .collect::<Option<Vec<_>>>()
            .ok_or(BlockOperationError::invalid(
                SyncAggregateInvalid::PubkeyNotFound,
            ))?
    };

    for (participant_index, participation_bit) in committee_indices
        .into_iter()
        .zip(sync_aggregate.sync_committee_bits.iter())
    {
        if participation_bit {
            state.increase_balance(participant_index, participant_reward)?;
            state.increase_balance(proposer_index, proposer_reward)?;
        } else {
            state.decrease_balance(participant_index, participant_reward)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ream_bls::{
        BLSSignature,
        traits::{Aggregatable, Signable},
    };
    use ream_consensus_misc::{
        constants::DOMAIN_SYNC_COMMITTEE,
        misc::{compute_epoch_at_slot, compute_signing_root},
    };
    use ream_network_spec::{fork_name::ForkName, networks::initialize_test_network_spec};
    use ssz_types::BitVector;

    use super::*;
    use crate::genesis::{interop_genesis_state, interop_secret_keys};

    fn genesis(count: usize) -> BeaconState {
        initialize_test_network_spec();
        let mut state = interop_genesis_state(&interop_secret_keys(count), ForkName::Altair)
            .expect("genesis should build");
        state.slot += 1;
        state
    }

    #[test]
    fn test_empty_aggregate_penalizes_every_member() {
        let mut state = genesis(16);
        let (participant_reward, _) = compute_sync_aggregate_rewards(&state).expect("rewards");
        let before = state.balances.clone();
        let committee = state
            .participation_flags()
            .expect("altair state")
            .current_sync_committee
            .clone();
        let pubkey_index_map = state.pubkey_index_map();
        let mut seats = vec![0u64; state.validators.len()];
        for pubkey in committee.pubkeys.iter() {
            seats[pubkey_index_map[pubkey] as usize] += 1;
        }

        process_sync_aggregate(&mut state, &SyncAggregate::empty(), 0, VerifySignatures::True)
            .expect("an empty aggregate with the infinity signature is valid");

        for (index, seats) in seats.iter().enumerate() {
            assert_eq!(state.balances[index], before[index] - seats * participant_reward);
        }
    }

    #[test]
    fn test_full_aggregate_rewards_members_and_proposer() {
        let keys = interop_secret_keys(16);
        let mut state = genesis(16);
        let (participant_reward, proposer_reward) =
            compute_sync_aggregate_rewards(&state).expect("rewards");
        assert!(participant_reward > 0);
        assert!(proposer_reward > 0);

        let previous_slot = state.slot - 1;
        let domain = state.get_domain(
            DOMAIN_SYNC_COMMITTEE,
            Some(compute_epoch_at_slot(previous_slot)),
        );
        let signing_root = compute_signing_root(
            &state.get_block_root_at_slot(previous_slot).expect("root known"),
            domain,
        );
        let committee = state
            .participation_flags()
            .expect("altair state")
            .current_sync_committee
            .clone();
        let pubkey_index_map = state.pubkey_index_map();
        let signatures = committee
            .pubkeys
            .iter()
            .map(|pubkey| {
                keys[pubkey_index_map[pubkey] as usize]
                    .sign(signing_root.as_slice())
                    .expect("signing succeeds")
            })
            .collect::<Vec<_>>();
        let mut sync_committee_bits = BitVector::new();
        for i in 0..SYNC_COMMITTEE_SIZE as usize {
            sync_committee_bits.set(i, true).expect("bit in range");
        }
        let sync_aggregate = SyncAggregate {
            sync_committee_bits,
            sync_committee_signature: BLSSignature::aggregate(
                &signatures.iter().collect::<Vec<_>>(),
            )
            .expect("aggregation succeeds"),
        };
        let before = state.balances.clone();

        process_sync_aggregate(&mut state, &sync_aggregate, 3, VerifySignatures::True)
            .expect("aggregate is valid");

        assert_eq!(
            state.balances.iter().sum::<u64>() - before.iter().sum::<u64>(),
            SYNC_COMMITTEE_SIZE * (participant_reward + proposer_reward)
        );
        assert!(state.balances[3] > before[3]);
    }

    #[test]
    fn test_bad_signature_is_rejected() {
        let mut state = genesis(16);
        let mut sync_aggregate = SyncAggregate::empty();
        sync_aggregate
            .sync_committee_bits
            .set(0, true)
            .expect("bit in range");
        sync_aggregate.sync_committee_signature = BLSSignature::infinity();

        assert_eq!(
            process_sync_aggregate(&mut state, &sync_aggregate, 0, VerifySignatures::True),
            Err(BlockOperationError::invalid(
                SyncAggregateInvalid::SignatureInvalid
            ))
        );
    }
}
