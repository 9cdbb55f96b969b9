use alloy_primitives::B256;

#[derive(Debug, PartialEq, Clone, Default, Eq, Hash)]
pub struct PrivateKey {
    pub inner: B256,
}
