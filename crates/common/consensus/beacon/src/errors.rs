use alloy_primitives::B256;
use ream_network_spec::fork_name::ForkName;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BeaconStateError {
    #[error("Unknown validator index {0}")]
    UnknownValidator(u64),
    #[error("Slot {slot} is out of the block root range of a state at slot {state_slot}")]
    SlotOutOfBounds { slot: u64, state_slot: u64 },
    #[error("Balance of validator {0} overflowed")]
    BalanceOverflow(u64),
    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),
    #[error("No active validators at epoch {0}")]
    NoActiveValidators(u64),
    #[error("Shuffling failed: {0}")]
    Shuffling(String),
    #[error("List {0} is full")]
    ListFull(&'static str),
    #[error("Public key is not part of the validator registry")]
    UnknownPubkey,
    #[error("Failed to aggregate public keys: {0}")]
    PubkeyAggregation(String),
    #[error("Bitfield access failed: {0}")]
    Bitfield(String),
    #[error("Failed to build genesis state: {0}")]
    Genesis(String),
    #[error("State at slot {slot} has {found} bookkeeping but the fork schedule expects {expected}")]
    IncorrectStateVariant {
        slot: u64,
        expected: ForkName,
        found: ForkName,
    },
}

impl From<anyhow::Error> for BeaconStateError {
    fn from(err: anyhow::Error) -> Self {
        BeaconStateError::Shuffling(err.to_string())
    }
}

/// Why a signature set could not be built. Building a set never checks the signature itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureSetError {
    #[error("Validator {0} is unknown")]
    ValidatorUnknown(u64),
    #[error("Block proposer {block} does not match the local shuffling ({local_shuffling})")]
    IncorrectBlockProposer { block: u64, local_shuffling: u64 },
    #[error("Block does not carry a sync aggregate")]
    MissingSyncAggregate,
    #[error(transparent)]
    BeaconStateError(#[from] BeaconStateError),
}

/// Coarse grouping of block rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockErrorKind {
    MalformedInput,
    InvalidSignature,
    ConsensusRuleViolation,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProposerSlashingInvalid {
    #[error("Header slots differ: {0} and {1}")]
    ProposalSlotMismatch(u64, u64),
    #[error("Header proposers differ: {0} and {1}")]
    ProposerIndexMismatch(u64, u64),
    #[error("Headers are equal")]
    ProposalsIdentical,
    #[error("Proposer {0} is not slashable")]
    ProposerNotSlashable(u64),
    #[error("Proposer {0} is unknown")]
    ProposerUnknown(u64),
    #[error("Signature of header 1 is invalid")]
    BadProposal1Signature,
    #[error("Signature of header 2 is invalid")]
    BadProposal2Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexedAttestationInvalid {
    #[error("Attesting indices are empty")]
    IndicesEmpty,
    #[error("Attesting indices are not sorted and unique")]
    BadValidatorIndicesOrdering,
    #[error("Attesting validator {0} is unknown")]
    UnknownValidator(u64),
    #[error("Aggregate signature is invalid")]
    BadSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttesterSlashingInvalid {
    #[error("Attestations are not slashable")]
    NotSlashable,
    #[error("Attestation 1 is invalid: {0}")]
    IndexedAttestation1Invalid(IndexedAttestationInvalid),
    #[error("Attestation 2 is invalid: {0}")]
    IndexedAttestation2Invalid(IndexedAttestationInvalid),
    #[error("No slashable validator in the intersection")]
    NoSlashableIndices,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttestationInvalid {
    #[error("Committee index {index} is out of range ({committee_count} committees per slot)")]
    BadCommitteeIndex { index: u64, committee_count: u64 },
    #[error("Target epoch {target} is neither the previous nor the current epoch {current}")]
    BadTargetEpoch { target: u64, current: u64 },
    #[error("Target epoch {target} does not contain slot {slot}")]
    TargetEpochSlotMismatch { target: u64, slot: u64 },
    #[error("Attestation for slot {attestation} included too early at {state}")]
    IncludedTooEarly { state: u64, attestation: u64 },
    #[error("Attestation for slot {attestation} included too late at {state}")]
    IncludedTooLate { state: u64, attestation: u64 },
    #[error("Aggregation bits length {bits} does not match committee size {committee}")]
    BadAggregationBitfieldLength { committee: usize, bits: usize },
    #[error("Source checkpoint does not match the justified checkpoint")]
    WrongJustifiedCheckpoint,
    #[error("Attestation is invalid: {0}")]
    BadIndexedAttestation(IndexedAttestationInvalid),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DepositInvalid {
    #[error("Merkle proof does not match the eth1 deposit root")]
    BadMerkleProof,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExitInvalid {
    #[error("Validator {0} is unknown")]
    ValidatorUnknown(u64),
    #[error("Validator {0} is not active")]
    NotActive(u64),
    #[error("Validator {validator} has already initiated an exit at epoch {exit_epoch}")]
    AlreadyExited { validator: u64, exit_epoch: u64 },
    #[error("Exit epoch {exit_epoch} is in the future of the state epoch {state_epoch}")]
    FutureEpoch { state_epoch: u64, exit_epoch: u64 },
    #[error("Validator has only been active since epoch {activation_epoch}; exits open at {earliest_exit_epoch}")]
    TooYoungToExit {
        activation_epoch: u64,
        earliest_exit_epoch: u64,
    },
    #[error("Exit signature is invalid")]
    BadSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncAggregateInvalid {
    #[error("Sync committee signature is invalid")]
    SignatureInvalid,
    #[error("Sync committee member is missing from the registry")]
    PubkeyNotFound,
}

/// A failure inside one operation, before its position in the block is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOperationError<T> {
    Invalid(T),
    BeaconStateError(BeaconStateError),
    SignatureSetError(SignatureSetError),
}

impl<T> BlockOperationError<T> {
    pub fn invalid(reason: T) -> Self {
        BlockOperationError::Invalid(reason)
    }

    pub fn map_invalid<U>(self, f: impl FnOnce(T) -> U) -> BlockOperationError<U> {
        match self {
            BlockOperationError::Invalid(reason) => BlockOperationError::Invalid(f(reason)),
            BlockOperationError::BeaconStateError(err) => BlockOperationError::BeaconStateError(err),
            BlockOperationError::SignatureSetError(err) => {
                BlockOperationError::SignatureSetError(err)
            }
        }
    }
}

impl<T> From<BeaconStateError> for BlockOperationError<T> {
    fn from(err: BeaconStateError) -> Self {
        BlockOperationError::BeaconStateError(err)
    }
}

impl<T> From<SignatureSetError> for BlockOperationError<T> {
    fn from(err: SignatureSetError) -> Self {
        BlockOperationError::SignatureSetError(err)
    }
}

pub trait IntoWithIndex: Sized {
    fn into_with_index(self, index: usize) -> BlockProcessingError;
}

macro_rules! impl_into_with_index {
    ($($reason: ident => $variant: ident),*) => {
        $(
            impl IntoWithIndex for BlockOperationError<$reason> {
                fn into_with_index(self, index: usize) -> BlockProcessingError {
                    match self {
                        BlockOperationError::Invalid(reason) => {
                            BlockProcessingError::$variant { index, reason }
                        }
                        BlockOperationError::BeaconStateError(err) => err.into(),
                        BlockOperationError::SignatureSetError(err) => err.into(),
                    }
                }
            }
        )*
    };
}

impl_into_with_index!(
    ProposerSlashingInvalid => ProposerSlashingInvalid,
    AttesterSlashingInvalid => AttesterSlashingInvalid,
    AttestationInvalid => AttestationInvalid,
    DepositInvalid => DepositInvalid,
    ExitInvalid => ExitInvalid
);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockProcessingError {
    #[error("Block is built for {block} but the fork schedule expects {expected} at its slot")]
    InconsistentBlockFork { block: ForkName, expected: ForkName },
    #[error("Block slot {block} does not match state slot {state}")]
    StateSlotMismatch { state: u64, block: u64 },
    #[error("Block slot {block} is not newer than the latest block header at {latest}")]
    BlockNotNewerThanLatestHeader { latest: u64, block: u64 },
    #[error("Block proposer {block} does not match the local shuffling ({local_shuffling})")]
    IncorrectBlockProposer { block: u64, local_shuffling: u64 },
    #[error("Parent root {block} does not match the latest block header root {state}")]
    ParentBlockRootMismatch { state: B256, block: B256 },
    #[error("Proposer {0} is slashed")]
    ProposerSlashed(u64),
    #[error("Block proposal signature is invalid")]
    ProposalSignatureInvalid,
    #[error("Randao reveal is invalid")]
    RandaoSignatureInvalid,
    #[error("Bulk signature verification failed")]
    BulkSignatureVerificationFailed,
    #[error("Expected {expected} deposits, found {found}")]
    DepositCountInvalid { expected: u64, found: u64 },
    #[error("Proposer slashing {index} is invalid: {reason}")]
    ProposerSlashingInvalid {
        index: usize,
        reason: ProposerSlashingInvalid,
    },
    #[error("Attester slashing {index} is invalid: {reason}")]
    AttesterSlashingInvalid {
        index: usize,
        reason: AttesterSlashingInvalid,
    },
    #[error("Attestation {index} is invalid: {reason}")]
    AttestationInvalid {
        index: usize,
        reason: AttestationInvalid,
    },
    #[error("Deposit {index} is invalid: {reason}")]
    DepositInvalid { index: usize, reason: DepositInvalid },
    #[error("Voluntary exit {index} is invalid: {reason}")]
    ExitInvalid { index: usize, reason: ExitInvalid },
    #[error("Sync aggregate is invalid: {0}")]
    SyncAggregateInvalid(SyncAggregateInvalid),
    #[error("Could not collect signatures: {0}")]
    SignatureSetError(SignatureSetError),
    #[error(transparent)]
    BeaconStateError(#[from] BeaconStateError),
}

impl From<SignatureSetError> for BlockProcessingError {
    fn from(err: SignatureSetError) -> Self {
        match err {
            SignatureSetError::IncorrectBlockProposer {
                block,
                local_shuffling,
            } => BlockProcessingError::IncorrectBlockProposer {
                block,
                local_shuffling,
            },
            SignatureSetError::BeaconStateError(err) => err.into(),
            err => BlockProcessingError::SignatureSetError(err),
        }
    }
}

impl From<BlockOperationError<SyncAggregateInvalid>> for BlockProcessingError {
    fn from(err: BlockOperationError<SyncAggregateInvalid>) -> Self {
        match err {
            BlockOperationError::Invalid(reason) => {
                BlockProcessingError::SyncAggregateInvalid(reason)
            }
            BlockOperationError::BeaconStateError(err) => err.into(),
            BlockOperationError::SignatureSetError(err) => err.into(),
        }
    }
}

impl BlockProcessingError {
    pub fn kind(&self) -> BlockErrorKind {
        match self {
            Self::InconsistentBlockFork { .. }
            | Self::StateSlotMismatch { .. }
            | Self::BlockNotNewerThanLatestHeader { .. }
            | Self::IncorrectBlockProposer { .. }
            | Self::ParentBlockRootMismatch { .. }
            | Self::DepositCountInvalid { .. } => BlockErrorKind::MalformedInput,
            Self::ProposalSignatureInvalid
            | Self::RandaoSignatureInvalid
            | Self::BulkSignatureVerificationFailed
            | Self::SyncAggregateInvalid(SyncAggregateInvalid::SignatureInvalid)
            | Self::ProposerSlashingInvalid {
                reason:
                    ProposerSlashingInvalid::BadProposal1Signature
                    | ProposerSlashingInvalid::BadProposal2Signature,
                ..
            }
            | Self::AttesterSlashingInvalid {
                reason:
                    AttesterSlashingInvalid::IndexedAttestation1Invalid(
                        IndexedAttestationInvalid::BadSignature,
                    )
                    | AttesterSlashingInvalid::IndexedAttestation2Invalid(
                        IndexedAttestationInvalid::BadSignature,
                    ),
                ..
            }
            | Self::AttestationInvalid {
                reason:
                    AttestationInvalid::BadIndexedAttestation(IndexedAttestationInvalid::BadSignature),
                ..
            }
            | Self::ExitInvalid {
                reason: ExitInvalid::BadSignature,
                ..
            } => BlockErrorKind::InvalidSignature,
            Self::AttestationInvalid {
                reason:
                    AttestationInvalid::BadCommitteeIndex { .. }
                    | AttestationInvalid::BadAggregationBitfieldLength { .. }
                    | AttestationInvalid::BadIndexedAttestation(_),
                ..
            }
            | Self::AttesterSlashingInvalid {
                reason:
                    AttesterSlashingInvalid::IndexedAttestation1Invalid(_)
                    | AttesterSlashingInvalid::IndexedAttestation2Invalid(_),
                ..
            }
            | Self::ProposerSlashingInvalid {
                reason:
                    ProposerSlashingInvalid::ProposalSlotMismatch(..)
                    | ProposerSlashingInvalid::ProposerIndexMismatch(..)
                    | ProposerSlashingInvalid::ProposerUnknown(_),
                ..
            }
            | Self::ExitInvalid {
                reason: ExitInvalid::ValidatorUnknown(_),
                ..
            }
            | Self::SyncAggregateInvalid(SyncAggregateInvalid::PubkeyNotFound) => {
                BlockErrorKind::MalformedInput
            }
            Self::ProposerSlashingInvalid { .. }
            | Self::AttesterSlashingInvalid { .. }
            | Self::AttestationInvalid { .. }
            | Self::DepositInvalid { .. }
            | Self::ExitInvalid { .. }
            | Self::ProposerSlashed(_) => BlockErrorKind::ConsensusRuleViolation,
            Self::SignatureSetError(_) | Self::BeaconStateError(_) => BlockErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EpochProcessingError {
    /// The total active balance does not fit in a u64 of Gwei. Only reachable with a preset whose
    /// maximum effective balance is wrong for the validator count.
    #[error("Total active balance overflowed: {increments} increments")]
    TotalActiveBalanceOverflow { increments: u64 },
    #[error("Validator statuses cover {statuses} validators but the registry has {validators}")]
    ValidatorStatusesInconsistent { statuses: usize, validators: usize },
    #[error(transparent)]
    BeaconStateError(#[from] BeaconStateError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotProcessingError {
    #[error("Target slot {target} is before the state slot {state}")]
    SlotInPast { state: u64, target: u64 },
    #[error(transparent)]
    EpochProcessingError(#[from] EpochProcessingError),
    #[error(transparent)]
    BeaconStateError(#[from] BeaconStateError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    #[error(transparent)]
    SlotProcessingError(#[from] SlotProcessingError),
    #[error(transparent)]
    BlockProcessingError(#[from] BlockProcessingError),
    #[error("State root {computed} does not match the block state root {block}")]
    StateRootMismatch { block: B256, computed: B256 },
}
