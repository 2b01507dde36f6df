//! Denomination reference records.

use serde::{Deserialize, Serialize};

/// Asset metadata keyed by its on-chain denom (e.g. `inj`, `peggy0x...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denom {
    pub denom: String,
    pub symbol: String,
    pub decimals: u8,
    pub display_name: String,
}
