#![warn(clippy::unwrap_used)]

pub mod attestation_data;
pub mod beacon_block_header;
pub mod checkpoint;
pub mod constants;
pub mod deposit_data;
pub mod deposit_message;
pub mod eth_1_data;
pub mod fork;
pub mod fork_data;
pub mod historical_batch;
pub mod indexed_attestation;
pub mod misc;
pub mod pending_attestation;
pub mod signing_data;
pub mod sync_committee;
pub mod validator;
