use crate::{AggregatePubKey, PubKey, traits::Aggregatable};

impl AggregatePubKey {
    pub fn aggregate(pubkeys: &[&PubKey]) -> anyhow::Result<Self> {
        Ok(Self {
            inner: PubKey::aggregate(pubkeys)?,
        })
    }
}
