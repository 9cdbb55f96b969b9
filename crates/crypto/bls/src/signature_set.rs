//! A [SignatureSet] is one verification obligation: a signature, the public key(s) it must verify
//! against and the signing root. Sets can be checked one at a time with [SignatureSet::verify] or
//! all at once with `verify_signature_sets`.

use std::borrow::Cow;

use alloy_primitives::B256;

use crate::{PubKey, signature::BLSSignature};

#[derive(Debug, Clone, PartialEq)]
pub enum SigningKeys<'a> {
    Single(Cow<'a, PubKey>),
    /// Keys that are aggregated into one key before verification.
    Aggregate(Vec<Cow<'a, PubKey>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureSet<'a> {
    pub signature: &'a BLSSignature,
    pub signing_keys: SigningKeys<'a>,
    pub message: B256,
}

impl<'a> SignatureSet<'a> {
    pub fn single_pubkey(
        signature: &'a BLSSignature,
        signing_key: Cow<'a, PubKey>,
        message: B256,
    ) -> Self {
        Self {
            signature,
            signing_keys: SigningKeys::Single(signing_key),
            message,
        }
    }

    pub fn multiple_pubkeys(
        signature: &'a BLSSignature,
        signing_keys: Vec<Cow<'a, PubKey>>,
        message: B256,
    ) -> Self {
        Self {
            signature,
            signing_keys: SigningKeys::Aggregate(signing_keys),
            message,
        }
    }

    pub fn num_keys(&self) -> usize {
        match &self.signing_keys {
            SigningKeys::Single(_) => 1,
            SigningKeys::Aggregate(keys) => keys.len(),
        }
    }
}
