//! Identity types: guild ids and Injective account addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::StorageError;

/// Bech32 human-readable prefix plus separator for Injective accounts.
pub const ADDRESS_PREFIX: &str = "inj1";
/// Length of an account address: prefix, 32 data chars, 6 checksum chars.
pub const ADDRESS_LEN: usize = 42;

/// Store-generated identity of a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(Uuid);

impl GuildId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a guild id received from a caller.
    pub fn parse(input: &str) -> Result<Self, StorageError> {
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|source| StorageError::InvalidGuildId {
                input: input.to_string(),
                source,
            })
    }
}

impl Default for GuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for GuildId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An Injective account address (`inj1...`).
///
/// Only the shape is validated; the bech32 checksum is left to the chain
/// client that produced the address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Result<Self, StorageError> {
        let value = value.into();
        let well_formed = value.len() == ADDRESS_LEN
            && value.starts_with(ADDRESS_PREFIX)
            && value
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
        if !well_formed {
            return Err(StorageError::InvalidAddress(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl FromStr for Address {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
