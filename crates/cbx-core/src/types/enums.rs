//! Small enums shared across the pipeline.

use serde::{Deserialize, Serialize};

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Bid = 0,
    Ask = 1,
}

impl Side {
    /// Side of a resting order from its buy flag.
    #[inline]
    pub fn from_is_bid(is_bid: bool) -> Self {
        if is_bid { Self::Bid } else { Self::Ask }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}
