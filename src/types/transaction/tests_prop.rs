use k256::ecdsa::SigningKey;
use proptest::prelude::*;

use crate::crypto::address_from_key;
use crate::types::{AccountId, SignedTx, Tx};

fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(32);
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

// A leading zero byte keeps the scalar well below the curve order, and the
// remaining bytes are non-zero, so key construction cannot fail.
fn signing_key_from_seed(seed: [u8; 31]) -> SigningKey {
    let mut bytes = [0u8; 32];
    bytes[1..].copy_from_slice(&seed);
    SigningKey::from_slice(&bytes).expect("scalar in range")
}

prop_compose! {
    fn arb_transfer()(seed in prop::array::uniform31(1u8..),
                      to in prop::array::uniform20(any::<u8>()),
                      chain_id in any::<u16>(),
                      nonce in any::<u64>(),
                      value in any::<u64>(),
                      tip in any::<u64>(),
                      data in prop::collection::vec(any::<u8>(), 0..32))
        -> (SigningKey, Tx)
    {
        let signing = signing_key_from_seed(seed);
        let from = address_from_key(signing.verifying_key());
        let tx = Tx {
            chain_id,
            nonce,
            from_id: from,
            to_id: AccountId::from_bytes(to),
            value,
            tip,
            data,
        };
        (signing, tx)
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    fn sign_recover_round_trip((signing, tx) in arb_transfer()) {
        let signed = SignedTx::sign(tx.clone(), &signing).expect("sign");
        prop_assert!((29..=30).contains(&signed.v));
        let recovered = signed.from_account().expect("recover");
        prop_assert_eq!(recovered, tx.from_id.clone());
        signed.validate(tx.chain_id).expect("validate");
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    fn serde_preserves_signature((signing, tx) in arb_transfer()) {
        let signed = SignedTx::sign(tx, &signing).expect("sign");
        let json = serde_json::to_string(&signed).expect("serialize");
        let back: SignedTx = serde_json::from_str(&json).expect("deserialize");
        prop_assert_eq!(signed, back);
    }
}
