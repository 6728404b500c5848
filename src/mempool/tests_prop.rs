use std::collections::HashMap;

use k256::ecdsa::SigningKey;
use proptest::prelude::*;

use super::{Mempool, STRATEGY_TIP, STRATEGY_TIP_ADVANCED};
use crate::crypto::address_from_key;
use crate::types::{AccountId, BlockTx, SignedTx, Tx};

fn proptest_config() -> ProptestConfig {
    // Signing is comparatively expensive; keep the case count modest.
    ProptestConfig {
        cases: 16,
        ..ProptestConfig::default()
    }
}

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).expect("key")
}

fn pending(key: &SigningKey, nonce: u64, tip: u64) -> BlockTx {
    let tx = Tx {
        chain_id: 1,
        nonce,
        from_id: address_from_key(key.verifying_key()),
        to_id: AccountId::from_bytes([0x22; 20]),
        value: 10,
        tip,
        data: Vec::new(),
    };
    BlockTx::new(SignedTx::sign(tx, key).expect("sign"), 1, 1)
}

fn assert_selection_invariants(
    selected: &[BlockTx],
    pool_size: usize,
    how_many: usize,
) -> Result<(), TestCaseError> {
    prop_assert!(selected.len() <= how_many.min(pool_size));
    let mut last_nonce: HashMap<AccountId, u64> = HashMap::new();
    for tx in selected {
        let sender = tx.signed.tx.from_id.clone();
        if let Some(last) = last_nonce.get(&sender) {
            prop_assert!(tx.signed.tx.nonce > *last, "nonce order violated");
        }
        last_nonce.insert(sender, tx.signed.tx.nonce);
    }
    Ok(())
}

prop_compose! {
    fn arb_pool_entries()(entries in prop::collection::vec(
        (0u8..3, 1u64..12, 0u64..100),
        1..24,
    )) -> Vec<(u8, u64, u64)> {
        entries
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    fn tip_selection_never_violates_nonce_order(
        entries in arb_pool_entries(),
        how_many in 0usize..16,
    ) {
        let keys = [signing_key(1), signing_key(2), signing_key(3)];
        let pool = Mempool::with_strategy(STRATEGY_TIP).expect("pool");
        for (who, nonce, tip) in entries {
            pool.upsert(pending(&keys[usize::from(who)], nonce, tip));
        }
        let selected = pool.pick_best(how_many);
        assert_selection_invariants(&selected, pool.count(), how_many)?;
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    fn advanced_selection_never_violates_nonce_order(
        entries in arb_pool_entries(),
        how_many in 0usize..16,
    ) {
        let keys = [signing_key(1), signing_key(2), signing_key(3)];
        let pool = Mempool::with_strategy(STRATEGY_TIP_ADVANCED).expect("pool");
        for (who, nonce, tip) in entries {
            pool.upsert(pending(&keys[usize::from(who)], nonce, tip));
        }
        let selected = pool.pick_best(how_many);
        assert_selection_invariants(&selected, pool.count(), how_many)?;
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    fn upserts_keep_one_entry_per_sender_nonce(entries in arb_pool_entries()) {
        let keys = [signing_key(1), signing_key(2), signing_key(3)];
        let pool = Mempool::new();
        let mut expected: HashMap<(u8, u64), u64> = HashMap::new();
        for (who, nonce, tip) in entries {
            pool.upsert(pending(&keys[usize::from(who)], nonce, tip));
            expected.insert((who, nonce), tip);
        }
        prop_assert_eq!(pool.count(), expected.len());
    }
}
