use blst::{
    BLST_ERROR, blst_scalar,
    min_pk::{AggregatePublicKey as BlstAggregatePublicKey, PublicKey as BlstPublicKey, Signature},
};

use crate::{
    constants::DST,
    errors::BLSError,
    signature_set::{SignatureSet, SigningKeys},
};

/// Bits of randomness applied to each set in a batch.
const RAND_BITS: usize = 64;

impl SigningKeys<'_> {
    pub fn to_blst_pubkey(&self) -> Result<BlstPublicKey, BLSError> {
        match self {
            SigningKeys::Single(pubkey) => pubkey.to_blst_pubkey(),
            SigningKeys::Aggregate(pubkeys) => {
                if pubkeys.is_empty() {
                    return Err(BLSError::EmptyAggregate);
                }
                let public_keys = pubkeys
                    .iter()
                    .map(|pubkey| pubkey.to_blst_pubkey())
                    .collect::<Result<Vec<_>, _>>()?;
                let aggregate_public_key = BlstAggregatePublicKey::aggregate(
                    &public_keys.iter().collect::<Vec<_>>(),
                    false,
                )?;
                Ok(aggregate_public_key.to_public_key())
            }
        }
    }
}

impl SignatureSet<'_> {
    /// Verifies this set on its own.
    pub fn verify(&self) -> bool {
        let Ok(signature) = self.signature.to_blst_signature() else {
            return false;
        };
        let Ok(public_key) = self.signing_keys.to_blst_pubkey() else {
            return false;
        };
        signature.verify(true, self.message.as_slice(), DST, &[], &public_key, true)
            == BLST_ERROR::BLST_SUCCESS
    }
}

/// Verifies every set in one multi-pairing, each set weighted by a random non-zero scalar.
///
/// Returns `true` only if all sets are valid. An empty batch is trivially valid. Any set whose
/// signature or keys cannot be decoded makes the whole batch invalid.
pub fn verify_signature_sets<'a, 'b, I>(sets: I) -> bool
where
    I: IntoIterator<Item = &'b SignatureSet<'a>>,
    'a: 'b,
{
    let mut signatures = vec![];
    let mut public_keys = vec![];
    let mut messages = vec![];

    for set in sets {
        let Ok(signature) = set.signature.to_blst_signature() else {
            return false;
        };
        let Ok(public_key) = set.signing_keys.to_blst_pubkey() else {
            return false;
        };
        signatures.push(signature);
        public_keys.push(public_key);
        messages.push(set.message);
    }

    if signatures.is_empty() {
        return true;
    }

    let rands = (0..signatures.len())
        .map(|_| random_scalar())
        .collect::<Vec<_>>();

    Signature::verify_multiple_aggregate_signatures(
        &messages
            .iter()
            .map(|message| message.as_slice())
            .collect::<Vec<_>>(),
        DST,
        &public_keys.iter().collect::<Vec<_>>(),
        true,
        &signatures.iter().collect::<Vec<_>>(),
        true,
        &rands,
        RAND_BITS,
    ) == BLST_ERROR::BLST_SUCCESS
}

fn random_scalar() -> blst_scalar {
    let mut value = 0;
    while value == 0 {
        value = rand::random::<u64>();
    }
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&value.to_le_bytes());
    blst_scalar { b: bytes }
}
