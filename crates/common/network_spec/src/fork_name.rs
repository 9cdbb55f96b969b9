use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol variants the state transition knows about, in activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    Phase0,
    Altair,
}

impl fmt::Display for ForkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkName::Phase0 => write!(f, "phase0"),
            ForkName::Altair => write!(f, "altair"),
        }
    }
}
