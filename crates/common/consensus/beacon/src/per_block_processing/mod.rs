//! Block transition. [process_block] validates a block against a state already advanced to the
//! block's slot and applies it.

pub mod block_signature_verifier;
pub mod process_operations;
pub mod signature_sets;
pub mod sync_aggregate;

use alloy_primitives::B256;
use ethereum_hashing::hash;
use ream_consensus_misc::{
    beacon_block_header::BeaconBlockHeader,
    constants::{EPOCHS_PER_ETH1_VOTING_PERIOD, EPOCHS_PER_HISTORICAL_VECTOR, SLOTS_PER_EPOCH},
    eth_1_data::Eth1Data,
    misc::xor,
};
use ream_metrics::{BLOCK_PROCESSING_TIME, start_timer_vec, stop_timer};
use ream_network_spec::networks::beacon_network_spec;
use tracing::debug;
use tree_hash::TreeHash;

pub use self::block_signature_verifier::BlockSignatureVerifier;
use self::{
    process_operations::process_operations,
    signature_sets::{block_proposal_signature_set, randao_signature_set},
    sync_aggregate::process_sync_aggregate,
};
use crate::{
    beacon_block::{BeaconBlock, SignedBeaconBlock},
    beacon_state::BeaconState,
    errors::{BeaconStateError, BlockProcessingError},
};

/// How the signatures of a block are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSignatureStrategy {
    /// Trust every signature, for blocks that were verified before.
    NoVerification,
    /// Check each signature where the operation carrying it is processed.
    VerifyIndividual,
    /// Check only the randao reveal.
    VerifyRandao,
    /// Collect every signature and check them in one batch before touching the state.
    VerifyBulk,
}

/// Whether an individual operation checks its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifySignatures {
    True,
    False,
}

impl VerifySignatures {
    pub fn is_true(self) -> bool {
        self == VerifySignatures::True
    }
}

/// Apply ``signed_block`` to ``state``, which must already be at the block's slot.
///
/// On error the state may be partially modified and must be discarded.
pub fn process_block(
    state: &mut BeaconState,
    signed_block: &SignedBeaconBlock,
    block_signature_strategy: BlockSignatureStrategy,
) -> Result<(), BlockProcessingError> {
    let block = &signed_block.message;

    let expected = beacon_network_spec().fork_name_at_slot(block.slot);
    let block_fork = block.body.fork_name();
    if block_fork != expected {
        return Err(BlockProcessingError::InconsistentBlockFork {
            block: block_fork,
            expected,
        });
    }
    if state.slot != block.slot {
        return Err(BlockProcessingError::StateSlotMismatch {
            state: state.slot,
            block: block.slot,
        });
    }
    state.ensure_fork_consistency()?;

    let verify_signatures = match block_signature_strategy {
        BlockSignatureStrategy::VerifyBulk => {
            let timer = start_timer_vec(&BLOCK_PROCESSING_TIME, &["bulk_signature_verification"]);
            BlockSignatureVerifier::verify_entire_block(state, signed_block)?;
            stop_timer(timer);
            VerifySignatures::False
        }
        BlockSignatureStrategy::VerifyIndividual => VerifySignatures::True,
        BlockSignatureStrategy::NoVerification | BlockSignatureStrategy::VerifyRandao => {
            VerifySignatures::False
        }
    };

    let timer = start_timer_vec(&BLOCK_PROCESSING_TIME, &["block_header"]);
    let proposer_index = process_block_header(state, block)?;
    stop_timer(timer);

    if verify_signatures.is_true() {
        verify_block_signature(state, signed_block)?;
    }

    let verify_randao = if block_signature_strategy == BlockSignatureStrategy::VerifyRandao {
        VerifySignatures::True
    } else {
        verify_signatures
    };
    process_randao(state, block, verify_randao)?;
    process_eth1_data(state, block.body.eth1_data())?;

    let timer = start_timer_vec(&BLOCK_PROCESSING_TIME, &["operations"]);
    process_operations(state, &block.body, proposer_index, verify_signatures)?;
    stop_timer(timer);

    if let Some(sync_aggregate) = block.body.sync_aggregate() {
        let timer = start_timer_vec(&BLOCK_PROCESSING_TIME, &["sync_aggregate"]);
        process_sync_aggregate(state, sync_aggregate, proposer_index, verify_signatures)?;
        stop_timer(timer);
    }

    debug!(
        slot = block.slot,
        proposer_index,
        fork = %block_fork,
        attestations = block.body.attestations().len(),
        "processed block"
    );
    Ok(())
}

/// Process the block header, returning the proposer index.
pub fn process_block_header(
    state: &mut BeaconState,
    block: &BeaconBlock,
) -> Result<u64, BlockProcessingError> {
    // Verify that the slots match
    if state.slot != block.slot {
        return Err(BlockProcessingError::StateSlotMismatch {
            state: state.slot,
            block: block.slot,
        });
    }

    // Verify that the block is newer than latest block header
    if block.slot <= state.latest_block_header.slot {
        return Err(BlockProcessingError::BlockNotNewerThanLatestHeader {
            latest: state.latest_block_header.slot,
            block: block.slot,
        });
    }

    // Verify that proposer index is the correct index
    let proposer_index = state.get_beacon_proposer_index()?;
    if block.proposer_index != proposer_index {
        return Err(BlockProcessingError::IncorrectBlockProposer {
            block: block.proposer_index,
            local_shuffling: proposer_index,
        });
    }

    // Verify that the parent matches
    let expected_parent_root = state.latest_block_header.tree_hash_root();
    if block.parent_root != expected_parent_root {
        return Err(BlockProcessingError::ParentBlockRootMismatch {
            state: expected_parent_root,
            block: block.parent_root,
        });
    }

    // Cache current block as the new latest block, its state root is filled in by the next
    // slot processing
    state.latest_block_header = BeaconBlockHeader {
        state_root: B256::ZERO,
        ..block.block_header()
    };

    // Verify proposer is not slashed
    if state.validator(proposer_index)?.slashed {
        return Err(BlockProcessingError::ProposerSlashed(proposer_index));
    }

    Ok(proposer_index)
}

/// Verify the proposer signature of ``signed_block``.
pub fn verify_block_signature(
    state: &BeaconState,
    signed_block: &SignedBeaconBlock,
) -> Result<(), BlockProcessingError> {
    if !block_proposal_signature_set(state, signed_block)?.verify() {
        return Err(BlockProcessingError::ProposalSignatureInvalid);
    }
    Ok(())
}

/// Verify the randao reveal if requested and mix it into the current randao mix.
pub fn process_randao(
    state: &mut BeaconState,
    block: &BeaconBlock,
    verify_signatures: VerifySignatures,
) -> Result<(), BlockProcessingError> {
    if verify_signatures.is_true() && !randao_signature_set(state, block)?.verify() {
        return Err(BlockProcessingError::RandaoSignatureInvalid);
    }

    // Mix in RANDAO reveal
    let epoch = state.get_current_epoch();
    let mix = xor(
        state.get_randao_mix(epoch).as_slice(),
        hash(block.body.randao_reveal().to_bytes()).as_slice(),
    );
    state.randao_mixes[(epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize] = mix;
    Ok(())
}

/// Record the eth1 vote of the block and adopt it once a strict majority of the voting period
/// agrees.
pub fn process_eth1_data(
    state: &mut BeaconState,
    eth1_data: &Eth1Data,
) -> Result<(), BeaconStateError> {
    state
        .eth1_data_votes
        .push(eth1_data.clone())
        .map_err(|_| BeaconStateError::ListFull("eth1 data votes"))?;

    let count = state
        .eth1_data_votes
        .iter()
        .filter(|vote| *vote == eth1_data)
        .count() as u64;
    if count * 2 > EPOCHS_PER_ETH1_VOTING_PERIOD * SLOTS_PER_EPOCH {
        state.eth1_data = eth1_data.clone();
    }
    Ok(())
}
