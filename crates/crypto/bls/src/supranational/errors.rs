use blst::BLST_ERROR;

use crate::errors::BLSError;

impl From<BLST_ERROR> for BLSError {
    fn from(err: BLST_ERROR) -> Self {
        BLSError::BlstError(format!("{err:?}"))
    }
}
