use ream_consensus_misc::fork::Fork;
use ream_network_spec::{fork_name::ForkName, networks::beacon_network_spec};
use ssz_types::VariableList;
use tracing::info;

use crate::{
    beacon_state::BeaconState,
    errors::BeaconStateError,
    participation::{EpochParticipation, ParticipationFlags, ParticipationList, add_flag},
    per_block_processing::process_operations::get_attestation_participation_flag_indices,
};

/// Convert the previous epoch attestations of a phase0 state into altair participation flags.
pub fn translate_participation(state: &BeaconState) -> Result<ParticipationList, BeaconStateError> {
    let mut previous_epoch_participation = vec![0u8; state.validators.len()];
    for attestation in state.pending_attestations()?.previous_epoch_attestations.iter() {
        let data = &attestation.data;

        // Apply flags to all attesting validators
        let participation_flag_indices =
            get_attestation_participation_flag_indices(state, data, attestation.inclusion_delay)?;
        for index in state.get_attesting_indices(data, &attestation.aggregation_bits)? {
            let participation = previous_epoch_participation
                .get_mut(index as usize)
                .ok_or(BeaconStateError::UnknownValidator(index))?;
            for flag_index in &participation_flag_indices {
                *participation = add_flag(*participation, *flag_index);
            }
        }
    }
    VariableList::new(previous_epoch_participation)
        .map_err(|_| BeaconStateError::ListFull("previous epoch participation"))
}

/// Turn a phase0 state at the first slot of the altair fork epoch into an altair state.
pub fn upgrade_to_altair(state: &mut BeaconState) -> Result<(), BeaconStateError> {
    let epoch = state.get_current_epoch();
    let previous_epoch_participation = translate_participation(state)?;

    // Fill in sync committees. The next sync committee equals the current one at the fork.
    let sync_committee = state.get_next_sync_committee()?;

    let validator_count = state.validators.len();
    let zeros = || {
        VariableList::new(vec![0u8; validator_count])
            .map_err(|_| BeaconStateError::ListFull("current epoch participation"))
    };
    let inactivity_scores = VariableList::new(vec![0u64; validator_count])
        .map_err(|_| BeaconStateError::ListFull("inactivity scores"))?;

    state.fork = Fork {
        previous_version: state.fork.current_version,
        current_version: beacon_network_spec().altair_fork_version,
        epoch,
    };
    state.participation = EpochParticipation::Altair(ParticipationFlags {
        previous_epoch_participation,
        current_epoch_participation: zeros()?,
        inactivity_scores,
        current_sync_committee: sync_committee.clone(),
        next_sync_committee: sync_committee,
    });

    info!(epoch, slot = state.slot, fork = %ForkName::Altair, "upgraded state");
    Ok(())
}
