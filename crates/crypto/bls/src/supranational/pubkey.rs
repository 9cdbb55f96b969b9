use anyhow::anyhow;
use blst::min_pk::{AggregatePublicKey as BlstAggregatePublicKey, PublicKey as BlstPublicKey};
use ssz_types::FixedVector;

use crate::{errors::BLSError, pubkey::PubKey, traits::Aggregatable};

impl From<BlstPublicKey> for PubKey {
    fn from(value: BlstPublicKey) -> Self {
        PubKey {
            inner: FixedVector::from(value.to_bytes().to_vec()),
        }
    }
}

impl PubKey {
    pub fn to_blst_pubkey(&self) -> Result<BlstPublicKey, BLSError> {
        BlstPublicKey::from_bytes(&self.inner).map_err(BLSError::from)
    }
}

impl Aggregatable<PubKey> for PubKey {
    type Error = anyhow::Error;

    fn aggregate(public_keys: &[&PubKey]) -> anyhow::Result<PubKey> {
        let public_keys = public_keys
            .iter()
            .map(|public_key| public_key.to_blst_pubkey())
            .collect::<Result<Vec<_>, _>>()?;
        let aggregate_public_key =
            BlstAggregatePublicKey::aggregate(&public_keys.iter().collect::<Vec<_>>(), true)
                .map_err(|err| anyhow!("Failed to aggregate and validate public keys {err:?}"))?;
        Ok(aggregate_public_key.to_public_key().into())
    }
}
