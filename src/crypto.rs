//! Hashing and recoverable ECDSA signing for transactions and block headers.
//!
//! Values are hashed over their canonical JSON encoding so that every node
//! derives identical digests for identical structures. Signatures carry a
//! shifted recovery id so they cannot be replayed on other secp256k1 chains.

use std::fs;
use std::path::Path;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::errors::{ChainError, ChainResult};
use crate::types::AccountId;

/// Hash used in place of a parent hash for the first block in the chain.
/// Unlike computed block hashes it carries the `0x` prefix, so it can never
/// collide with a real digest.
pub const ZERO_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Offset added to the raw ECDSA recovery id. Verification subtracts it
/// again; any `v` outside `[29, 30]` is rejected outright.
pub const RECOVERY_ID_OFFSET: u64 = 29;

const SIGNING_STAMP: &[u8] = b"\x19Signed Message:\n32";

/// Hashes any serializable value into 64 lowercase hex characters.
pub fn hash<T: Serialize>(value: &T) -> String {
    let data = serde_json::to_vec(value).expect("serializing value for hashing");
    hex::encode(Sha256::digest(&data))
}

/// Digest that is actually signed: the value hash wrapped in a fixed stamp
/// so arbitrary payloads can never collide with transaction signatures.
fn signing_digest<T: Serialize>(value: &T) -> [u8; 32] {
    let data = serde_json::to_vec(value).expect("serializing value for signing");
    let value_hash = Sha256::digest(&data);
    let mut hasher = Sha256::new();
    hasher.update(SIGNING_STAMP);
    hasher.update(value_hash);
    hasher.finalize().into()
}

/// Signs the value and returns the `(v, r, s)` triple with the shifted
/// recovery id.
pub fn sign<T: Serialize>(value: &T, key: &SigningKey) -> ChainResult<(u64, [u8; 32], [u8; 32])> {
    let digest = signing_digest(value);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .map_err(|_| ChainError::InvalidSignature)?;
    let (r, s) = signature.split_bytes();
    Ok((
        u64::from(recovery_id.to_byte()) + RECOVERY_ID_OFFSET,
        r.into(),
        s.into(),
    ))
}

/// Recovers the signing account from a `(v, r, s)` signature over the value.
pub fn recover<T: Serialize>(
    value: &T,
    v: u64,
    r: &[u8; 32],
    s: &[u8; 32],
) -> ChainResult<AccountId> {
    if !(RECOVERY_ID_OFFSET..=RECOVERY_ID_OFFSET + 1).contains(&v) {
        return Err(ChainError::InvalidSignature);
    }
    let recovery_id = RecoveryId::from_byte((v - RECOVERY_ID_OFFSET) as u8)
        .ok_or(ChainError::InvalidSignature)?;
    let signature =
        Signature::from_scalars(*r, *s).map_err(|_| ChainError::InvalidSignature)?;
    if signature.normalize_s().is_some() {
        return Err(ChainError::InvalidSignature);
    }
    let digest = signing_digest(value);
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| ChainError::InvalidSignature)?;
    Ok(address_from_key(&verifying_key))
}

/// Derives the 20-byte account address from an ECDSA public key: the low
/// 20 bytes of the Keccak-256 hash of the uncompressed point.
pub fn address_from_key(key: &VerifyingKey) -> AccountId {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    AccountId::from_bytes(digest[12..].try_into().expect("20 byte address"))
}

pub fn generate_private_key() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

pub fn save_private_key(path: &Path, key: &SigningKey) -> ChainResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, hex::encode(key.to_bytes()))?;
    Ok(())
}

pub fn load_private_key(path: &Path) -> ChainResult<SigningKey> {
    let raw = fs::read_to_string(path)?;
    let bytes = hex::decode(raw.trim())
        .map_err(|err| ChainError::Config(format!("invalid private key encoding: {err}")))?;
    SigningKey::from_slice(&bytes)
        .map_err(|err| ChainError::Config(format!("invalid private key bytes: {err}")))
}

/// Serde adapter for byte payloads encoded as `0x`-prefixed hex strings.
pub mod hex_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        hex::decode(value.trim_start_matches("0x")).map_err(Error::custom)
    }
}

/// Serde adapter for 32-byte signature scalars encoded as `0x`-prefixed hex.
pub mod hex_scalar {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; 32], D::Error> {
        let value = String::deserialize(deserializer)?;
        let bytes = hex::decode(value.trim_start_matches("0x")).map_err(Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::custom("expected 32 bytes"))
    }
}
