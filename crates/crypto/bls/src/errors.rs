use thiserror::Error;

#[derive(Error, PartialEq, Eq, Debug, Clone)]
pub enum BLSError {
    #[error("blst error: {0}")]
    BlstError(String),
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid hex string")]
    InvalidHexString,
    #[error("Invalid byte length")]
    InvalidByteLength,
    #[error("Cannot aggregate an empty set of keys")]
    EmptyAggregate,
}
