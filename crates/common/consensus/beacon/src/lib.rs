#![warn(clippy::unwrap_used)]

pub mod attestation;
pub mod attester_slashing;
pub mod attester_status;
pub mod beacon_block;
pub mod beacon_state;
pub mod deposit;
pub mod epoch_cache;
pub mod errors;
pub mod genesis;
pub mod mutators;
pub mod participation;
pub mod per_block_processing;
pub mod per_epoch_processing;
pub mod per_slot_processing;
pub mod proposer_slashing;
pub mod state_transition;
pub mod sync_aggregate;
pub mod upgrade;
pub mod voluntary_exit;

pub use state_transition::{advance_slots, apply_block, state_transition};
