//! Validated primitive types for domain entities.
//!
//! These newtypes provide:
//! - Type safety (can't accidentally pass a block number where an address is expected)
//! - Validation at construction time
//! - Domain semantics in function signatures

use std::fmt;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ETHEREUM ADDRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated 20-byte Ethereum address, stored canonical-lowercased.
///
/// Use `Address` from `alloy-primitives` for on-chain interaction, but this
/// type for persistence, registry membership, and dedup keys, where
/// case-insensitive comparison is required.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EthAddress([u8; 20]);

impl EthAddress {
    /// Create from a fixed-size array (infallible).
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Try to create from a byte slice.
    ///
    /// # Errors
    /// Returns `InvalidAddress::WrongLength` if the slice is not exactly 20 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, InvalidAddress> {
        let bytes: [u8; 20] = slice
            .try_into()
            .map_err(|_| InvalidAddress::WrongLength(slice.len()))?;
        Ok(Self(bytes))
    }

    /// Parse from hex string (with or without 0x prefix), case-insensitive.
    ///
    /// # Errors
    /// Returns `InvalidAddress` if the string is not valid hex or wrong length.
    pub fn from_hex(s: &str) -> Result<Self, InvalidAddress> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() != 40 {
            return Err(InvalidAddress::WrongLength(s.len() / 2));
        }
        let bytes = hex::decode(s).map_err(|_| InvalidAddress::InvalidHex)?;
        Self::from_slice(&bytes)
    }

    /// Get the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Get as a byte slice.
    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Convert to canonical lowercase hex string with 0x prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Check if this is the zero address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// The zero address (0x0000...0000).
    pub const ZERO: Self = Self([0u8; 20]);
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthAddress({})", self.to_hex())
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<EthAddress> for String {
    fn from(addr: EthAddress) -> Self {
        addr.to_hex()
    }
}

impl TryFrom<String> for EthAddress {
    type Error = InvalidAddress;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl TryFrom<&str> for EthAddress {
    type Error = InvalidAddress;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::from_hex(s)
    }
}

impl From<[u8; 20]> for EthAddress {
    fn from(bytes: [u8; 20]) -> Self {
        Self::new(bytes)
    }
}

impl From<Address> for EthAddress {
    fn from(addr: Address) -> Self {
        Self::new(addr.0.0)
    }
}

impl From<EthAddress> for Address {
    fn from(addr: EthAddress) -> Self {
        Self::from(addr.0)
    }
}

/// Error for invalid Ethereum addresses.
#[derive(Debug, Clone, Error)]
pub enum InvalidAddress {
    /// Address has wrong byte length.
    #[error("wrong length: expected 20 bytes, got {0}")]
    WrongLength(usize),
    /// Address contains invalid hex characters.
    #[error("invalid hex encoding")]
    InvalidHex,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK NUMBER (for type clarity)
// ═══════════════════════════════════════════════════════════════════════════════

/// Block number newtype for clarity in function signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockNumber(u64);

impl BlockNumber {
    /// Create a new block number.
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Get the value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the next block number (saturating at `u64::MAX`).
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the previous block number (saturating at 0).
    #[must_use]
    pub const fn prev(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl From<u64> for BlockNumber {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl From<BlockNumber> for u64 {
    fn from(b: BlockNumber) -> Self {
        b.0
    }
}

impl From<BlockNumber> for i64 {
    #[allow(clippy::cast_possible_wrap)]
    fn from(b: BlockNumber) -> Self {
        b.0 as Self
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod eth_address_tests {
        use super::*;

        #[test]
        fn from_hex_with_prefix() {
            let addr = EthAddress::from_hex("0x1234567890123456789012345678901234567890").unwrap();
            assert_eq!(addr.to_hex(), "0x1234567890123456789012345678901234567890");
        }

        #[test]
        fn from_hex_without_prefix() {
            let addr = EthAddress::from_hex("1234567890123456789012345678901234567890").unwrap();
            assert_eq!(addr.to_hex(), "0x1234567890123456789012345678901234567890");
        }

        #[test]
        fn from_hex_is_case_insensitive() {
            let lower = EthAddress::from_hex("0xabcdef0123456789abcdef0123456789abcdef01").unwrap();
            let upper = EthAddress::from_hex("0xABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
            assert_eq!(lower, upper);
            assert_eq!(lower.to_hex(), "0xabcdef0123456789abcdef0123456789abcdef01");
        }

        #[test]
        fn from_hex_wrong_length() {
            assert!(EthAddress::from_hex("0x1234").is_err());
        }

        #[test]
        fn from_hex_invalid_chars() {
            assert!(EthAddress::from_hex("0xgggggggggggggggggggggggggggggggggggggggg").is_err());
        }

        #[test]
        fn zero_address() {
            assert!(EthAddress::ZERO.is_zero());
            assert_eq!(
                EthAddress::ZERO.to_hex(),
                "0x0000000000000000000000000000000000000000"
            );
        }

        #[test]
        fn alloy_address_roundtrip() {
            let addr_hex = "0x1234567890123456789012345678901234567890";
            let eth_addr = EthAddress::from_hex(addr_hex).unwrap();
            let alloy_addr: Address = eth_addr.into();
            let back: EthAddress = alloy_addr.into();
            assert_eq!(eth_addr, back);
        }
    }

    mod block_number_tests {
        use super::*;

        #[test]
        fn new_and_get() {
            let block = BlockNumber::new(12345);
            assert_eq!(block.get(), 12345);
        }

        #[test]
        fn next() {
            let block = BlockNumber::new(100);
            assert_eq!(block.next().get(), 101);
        }

        #[test]
        fn prev() {
            let block = BlockNumber::new(100);
            assert_eq!(block.prev().get(), 99);
        }

        #[test]
        fn prev_saturates_at_zero() {
            let block = BlockNumber::new(0);
            assert_eq!(block.prev().get(), 0);
        }

        #[test]
        fn from_u64() {
            let block: BlockNumber = 42_u64.into();
            assert_eq!(block.get(), 42);
        }
    }
}
