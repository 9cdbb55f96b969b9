pub mod aggregate_pubkey;
pub mod constants;
pub mod errors;
pub mod private_key;
pub mod pubkey;
pub mod signature;
pub mod signature_set;
pub mod traits;

#[cfg(feature = "supranational")]
pub mod supranational;

pub use aggregate_pubkey::AggregatePubKey;
pub use private_key::PrivateKey;
pub use pubkey::PubKey;
pub use signature::BLSSignature;
pub use signature_set::{SignatureSet, SigningKeys};
#[cfg(feature = "supranational")]
pub use supranational::signature_set::verify_signature_sets;
