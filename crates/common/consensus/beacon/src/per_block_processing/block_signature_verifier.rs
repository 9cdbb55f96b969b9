use std::cmp::max;

use ream_bls::{SignatureSet, verify_signature_sets};
use ream_metrics::{SIGNATURE_SETS_VERIFIED, inc_int_counter_vec};
use rayon::prelude::*;
use tracing::debug;

use super::{
    process_operations::{get_checked_indexed_attestation, verify_indexed_attestation_indices},
    signature_sets::{
        attester_slashing_signature_sets, block_proposal_signature_set, exit_signature_set,
        indexed_attestation_signature_set, proposer_slashing_signature_set, randao_signature_set,
        sync_aggregate_signature_set,
    },
};
use crate::{
    beacon_block::{BeaconBlock, SignedBeaconBlock},
    beacon_state::BeaconState,
    errors::{
        AttesterSlashingInvalid, BlockOperationError, BlockProcessingError, ExitInvalid,
        IntoWithIndex, ProposerSlashingInvalid, SignatureSetError,
    },
};

/// Reads the BLS signatures and keys from a block, storing them as a `Vec<SignatureSet>`, so
/// that they can be checked with one batched verification.
///
/// Deposits are never included: a block stays valid when it carries deposits with invalid
/// signatures.
pub struct BlockSignatureVerifier<'a> {
    state: &'a BeaconState,
    sets: Vec<SignatureSet<'a>>,
}

impl<'a> BlockSignatureVerifier<'a> {
    pub fn new(state: &'a BeaconState) -> Self {
        Self {
            state,
            sets: vec![],
        }
    }

    /// Verify every signature of ``signed_block`` except those of its deposits.
    ///
    /// It is not possible to know which signature is invalid, only that at least one is.
    pub fn verify_entire_block(
        state: &'a BeaconState,
        signed_block: &'a SignedBeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        let mut verifier = Self::new(state);
        verifier.include_all_signatures(signed_block)?;
        verifier.verify()
    }

    pub fn include_all_signatures(
        &mut self,
        signed_block: &'a SignedBeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        self.include_block_proposal(signed_block)?;
        self.include_all_signatures_except_proposal(&signed_block.message)
    }

    pub fn include_all_signatures_except_proposal(
        &mut self,
        block: &'a BeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        self.include_randao_reveal(block)?;
        self.include_proposer_slashings(block)?;
        self.include_attester_slashings(block)?;
        self.include_attestations(block)?;
        self.include_exits(block)?;
        self.include_sync_aggregate(block)?;
        Ok(())
    }

    pub fn include_block_proposal(
        &mut self,
        signed_block: &'a SignedBeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        let set = block_proposal_signature_set(self.state, signed_block)?;
        self.sets.push(set);
        Ok(())
    }

    pub fn include_randao_reveal(
        &mut self,
        block: &'a BeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        let set = randao_signature_set(self.state, block)?;
        self.sets.push(set);
        Ok(())
    }

    pub fn include_proposer_slashings(
        &mut self,
        block: &'a BeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        for (index, proposer_slashing) in block.body.proposer_slashings().iter().enumerate() {
            let proposer_index = proposer_slashing.signed_header_1.message.proposer_index;
            if proposer_index as usize >= self.state.validators.len() {
                return Err(BlockOperationError::invalid(
                    ProposerSlashingInvalid::ProposerUnknown(proposer_index),
                )
                .into_with_index(index));
            }
            let (set_1, set_2) = proposer_slashing_signature_set(self.state, proposer_slashing)?;
            self.sets.push(set_1);
            self.sets.push(set_2);
        }
        Ok(())
    }

    pub fn include_attester_slashings(
        &mut self,
        block: &'a BeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        for (index, attester_slashing) in block.body.attester_slashings().iter().enumerate() {
            verify_indexed_attestation_indices(self.state, &attester_slashing.attestation_1)
                .map_err(|reason| {
                    BlockOperationError::invalid(
                        AttesterSlashingInvalid::IndexedAttestation1Invalid(reason),
                    )
                    .into_with_index(index)
                })?;
            verify_indexed_attestation_indices(self.state, &attester_slashing.attestation_2)
                .map_err(|reason| {
                    BlockOperationError::invalid(
                        AttesterSlashingInvalid::IndexedAttestation2Invalid(reason),
                    )
                    .into_with_index(index)
                })?;
            let (set_1, set_2) = attester_slashing_signature_sets(self.state, attester_slashing)?;
            self.sets.push(set_1);
            self.sets.push(set_2);
        }
        Ok(())
    }

    pub fn include_attestations(
        &mut self,
        block: &'a BeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        for (index, attestation) in block.body.attestations().iter().enumerate() {
            let indexed_attestation = get_checked_indexed_attestation(self.state, attestation)
                .map_err(|err| err.into_with_index(index))?;
            self.sets.push(indexed_attestation_signature_set(
                self.state,
                &attestation.signature,
                &indexed_attestation,
            )?);
        }
        Ok(())
    }

    pub fn include_exits(&mut self, block: &'a BeaconBlock) -> Result<(), BlockProcessingError> {
        for (index, signed_exit) in block.body.voluntary_exits().iter().enumerate() {
            let set = exit_signature_set(self.state, signed_exit).map_err(|err| match err {
                SignatureSetError::ValidatorUnknown(validator_index) => {
                    BlockOperationError::invalid(ExitInvalid::ValidatorUnknown(validator_index))
                        .into_with_index(index)
                }
                err => err.into(),
            })?;
            self.sets.push(set);
        }
        Ok(())
    }

    /// Altair blocks only. The set is skipped when nobody participated and the signature is the
    /// point at infinity.
    pub fn include_sync_aggregate(
        &mut self,
        block: &'a BeaconBlock,
    ) -> Result<(), BlockProcessingError> {
        if self.state.participation_flags().is_err() {
            return Ok(());
        }
        let sync_aggregate = block
            .body
            .sync_aggregate()
            .ok_or(SignatureSetError::MissingSyncAggregate)?;
        if let Some(set) = sync_aggregate_signature_set(self.state, sync_aggregate, block.slot)? {
            self.sets.push(set);
        }
        Ok(())
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    /// Verify all the collected signature sets, in parallel chunks of one batch each.
    pub fn verify(self) -> Result<(), BlockProcessingError> {
        let num_sets = self.sets.len();
        let chunk_size = max(1, num_sets / rayon::current_num_threads());
        let result = self
            .sets
            .par_chunks(chunk_size)
            .map(|chunk| verify_signature_sets(chunk.iter()))
            .reduce(|| true, |current, this| current && this);

        debug!(num_sets, result, "verified block signature sets");
        if result {
            inc_int_counter_vec(&SIGNATURE_SETS_VERIFIED, num_sets as u64, &["valid"]);
            Ok(())
        } else {
            inc_int_counter_vec(&SIGNATURE_SETS_VERIFIED, num_sets as u64, &["invalid"]);
            Err(BlockProcessingError::BulkSignatureVerificationFailed)
        }
    }
}
