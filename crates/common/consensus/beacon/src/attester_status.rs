//! Per-validator participation summary consumed by every epoch sub-transition.

pub const PREVIOUS_EPOCH_SOURCE: u8 = 1 << 0;
pub const PREVIOUS_EPOCH_TARGET: u8 = 1 << 1;
pub const PREVIOUS_EPOCH_HEAD: u8 = 1 << 2;
pub const CURRENT_EPOCH_SOURCE: u8 = 1 << 3;
pub const CURRENT_EPOCH_TARGET: u8 = 1 << 4;
pub const CURRENT_EPOCH_HEAD: u8 = 1 << 5;
pub const UNSLASHED: u8 = 1 << 6;
pub const ELIGIBLE_ATTESTER: u8 = 1 << 7;

/// Offset between a previous-epoch timely bit and its current-epoch counterpart.
pub const CURRENT_EPOCH_SHIFT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttesterStatus {
    pub flags: u8,
    /// Proposer that included the earliest previous-epoch attestation of this validator.
    pub proposer_index: Option<u64>,
    /// Smallest inclusion delay among this validator's previous-epoch attestations.
    pub inclusion_delay: u64,
    /// Active in the current epoch.
    pub active: bool,
}

impl AttesterStatus {
    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag == flag
    }

    pub fn set(&mut self, flag: u8) {
        self.flags |= flag;
    }

    pub fn is_unslashed(&self) -> bool {
        self.has(UNSLASHED)
    }

    pub fn is_eligible(&self) -> bool {
        self.has(ELIGIBLE_ATTESTER)
    }

    /// Unslashed and timely for every bit in ``flag``.
    pub fn is_unslashed_and(&self, flag: u8) -> bool {
        self.has(UNSLASHED | flag)
    }

    /// Record an inclusion of a previous-epoch attestation. Only a strictly smaller delay
    /// replaces the one seen so far, so the first of equal-delay inclusions wins.
    pub fn record_inclusion(&mut self, inclusion_delay: u64, proposer_index: u64) {
        if self.proposer_index.is_none() || inclusion_delay < self.inclusion_delay {
            self.inclusion_delay = inclusion_delay;
            self.proposer_index = Some(proposer_index);
        }
    }
}
