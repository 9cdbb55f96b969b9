pub mod aggregate_pubkey;
pub mod errors;
pub mod private_key;
pub mod pubkey;
pub mod signature;
pub mod signature_set;
