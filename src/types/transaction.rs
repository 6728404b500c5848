use std::fmt;

use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{self, hex_bytes, hex_scalar};
use crate::errors::{ChainError, ChainResult};
use crate::merkle::MerkleHashable;

use super::{now_unix, AccountId};

/// Unsigned value transfer as submitted by a wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub chain_id: u16,
    pub nonce: u64,
    pub from_id: AccountId,
    pub to_id: AccountId,
    pub value: u64,
    pub tip: u64,
    #[serde(with = "hex_bytes", default)]
    pub data: Vec<u8>,
}

/// A transaction plus its recoverable ECDSA signature. The `v` component
/// carries the shifted recovery id; consumers reject anything outside
/// `[29, 30]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    #[serde(flatten)]
    pub tx: Tx,
    pub v: u64,
    #[serde(with = "hex_scalar")]
    pub r: [u8; 32],
    #[serde(with = "hex_scalar")]
    pub s: [u8; 32],
}

impl SignedTx {
    pub fn sign(tx: Tx, key: &SigningKey) -> ChainResult<Self> {
        let (v, r, s) = crypto::sign(&tx, key)?;
        Ok(Self { tx, v, r, s })
    }

    /// Recovers the account that produced the signature.
    pub fn from_account(&self) -> ChainResult<AccountId> {
        crypto::recover(&self.tx, self.v, &self.r, &self.s)
    }

    /// Checks the chain id and that the signature recovers to the declared
    /// sender.
    pub fn validate(&self, chain_id: u16) -> ChainResult<()> {
        if self.tx.chain_id != chain_id {
            return Err(ChainError::WrongChain);
        }
        if self.from_account()? != self.tx.from_id {
            return Err(ChainError::InvalidSignature);
        }
        Ok(())
    }

    pub fn signature_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&self.r);
        bytes.extend_from_slice(&self.s);
        bytes.push(self.v as u8);
        format!("0x{}", hex::encode(bytes))
    }
}

impl fmt::Display for SignedTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx.from_id, self.tx.nonce)
    }
}

/// A signed transaction as it lives in the mempool and in blocks, stamped
/// with its admission time and the gas terms in force at admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTx {
    #[serde(flatten)]
    pub signed: SignedTx,
    pub timestamp: u64,
    pub gas_price: u64,
    pub gas_units: u64,
}

impl BlockTx {
    pub fn new(signed: SignedTx, gas_price: u64, gas_units: u64) -> Self {
        Self {
            signed,
            timestamp: now_unix(),
            gas_price,
            gas_units,
        }
    }

    pub fn from_account(&self) -> ChainResult<AccountId> {
        self.signed.from_account()
    }

    pub fn validate(&self, chain_id: u16) -> ChainResult<()> {
        self.signed.validate(chain_id)
    }

    /// Flat fee charged to the sender whether or not the transfer succeeds.
    pub fn gas_fee(&self) -> u64 {
        self.gas_price.saturating_mul(self.gas_units)
    }
}

impl fmt::Display for BlockTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signed)
    }
}

impl MerkleHashable for BlockTx {
    fn merkle_hash(&self) -> Vec<u8> {
        let data = serde_json::to_vec(self).expect("serializing transaction for hashing");
        Sha256::digest(&data).to_vec()
    }
}

#[cfg(test)]
mod tests_prop;

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).expect("key")
    }

    fn transfer(key: &SigningKey, nonce: u64) -> Tx {
        let from = crypto::address_from_key(key.verifying_key());
        Tx {
            chain_id: 1,
            nonce,
            from_id: from,
            to_id: AccountId::from_bytes([0x22; 20]),
            value: 100,
            tip: 10,
            data: Vec::new(),
        }
    }

    #[test]
    fn signed_tx_recovers_sender() {
        let key = key(3);
        let signed = SignedTx::sign(transfer(&key, 1), &key).unwrap();
        assert_eq!(signed.from_account().unwrap(), signed.tx.from_id);
        signed.validate(1).unwrap();
    }

    #[test]
    fn validate_rejects_wrong_chain() {
        let key = key(3);
        let signed = SignedTx::sign(transfer(&key, 1), &key).unwrap();
        assert!(matches!(signed.validate(2), Err(ChainError::WrongChain)));
    }

    #[test]
    fn validate_rejects_forged_sender() {
        let key = key(3);
        let mut tx = transfer(&key, 1);
        tx.from_id = AccountId::from_bytes([0x99; 20]);
        let signed = SignedTx::sign(tx, &key).unwrap();
        assert!(matches!(
            signed.validate(1),
            Err(ChainError::InvalidSignature)
        ));
    }

    #[test]
    fn signed_tx_json_round_trip() {
        let key = key(5);
        let signed = SignedTx::sign(transfer(&key, 7), &key).unwrap();
        let json = serde_json::to_string(&signed).unwrap();
        let back: SignedTx = serde_json::from_str(&json).unwrap();
        assert_eq!(signed, back);
    }

    #[test]
    fn block_tx_gas_fee_saturates() {
        let key = key(5);
        let signed = SignedTx::sign(transfer(&key, 7), &key).unwrap();
        let tx = BlockTx {
            signed,
            timestamp: 0,
            gas_price: u64::MAX,
            gas_units: 2,
        };
        assert_eq!(tx.gas_fee(), u64::MAX);
    }
}
