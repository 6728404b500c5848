use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ChainError, ChainResult};

/// A 20-byte account address in canonical `0x`-prefixed lowercase hex form.
///
/// Mixed-case input is accepted anywhere an id is parsed; the stored form is
/// always lowercased so ids compare and hash consistently.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn from_hex(value: &str) -> ChainResult<Self> {
        let digits = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .ok_or_else(|| ChainError::BadAddress(value.to_string()))?;
        if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ChainError::BadAddress(value.to_string()));
        }
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = ChainError;

    fn try_from(value: String) -> ChainResult<Self> {
        Self::from_hex(&value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl FromStr for AccountId {
    type Err = ChainError;

    fn from_str(value: &str) -> ChainResult<Self> {
        Self::from_hex(value)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Balance and replay-protection state for a single account. Accounts come
/// into existence on first credit and are never removed implicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub balance: u64,
    pub nonce: u64,
}

impl Account {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            balance: 0,
            nonce: 0,
        }
    }

    pub fn with_balance(account_id: AccountId, balance: u64) -> Self {
        Self {
            account_id,
            balance,
            nonce: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_case_and_canonicalizes() {
        let id = AccountId::from_hex("0XABCDEFabcdef0123456789ABCDEFabcdef012345").unwrap();
        assert_eq!(id.as_str(), "0xabcdefabcdef0123456789abcdefabcdef012345");
    }

    #[test]
    fn rejects_bad_addresses() {
        for bad in [
            "abcdefabcdef0123456789abcdefabcdef012345",
            "0x1234",
            "0xzzcdefabcdef0123456789abcdefabcdef012345",
            "",
        ] {
            assert!(matches!(
                AccountId::from_hex(bad),
                Err(ChainError::BadAddress(_))
            ));
        }
    }

    #[test]
    fn serde_round_trip_validates() {
        let id = AccountId::from_bytes([0xab; 20]);
        let json = serde_json::to_string(&id).unwrap();
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        assert!(serde_json::from_str::<AccountId>("\"0x123\"").is_err());
    }
}
