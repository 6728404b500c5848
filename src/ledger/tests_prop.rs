use std::collections::BTreeMap;
use std::sync::Arc;

use k256::ecdsa::SigningKey;
use proptest::prelude::*;

use super::Ledger;
use crate::crypto::address_from_key;
use crate::genesis::Genesis;
use crate::types::{AccountId, Block, BlockHeader, BlockTx, SignedTx, Tx};
use crate::ZERO_HASH;

fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 16,
        ..ProptestConfig::default()
    }
}

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).expect("key")
}

fn account_of(key: &SigningKey) -> AccountId {
    address_from_key(key.verifying_key())
}

fn seeded_genesis(senders: &[AccountId]) -> Arc<Genesis> {
    Arc::new(Genesis {
        date: "2024-03-01T00:00:00Z".to_string(),
        chain_id: 1,
        difficulty: 1,
        trans_per_block: 32,
        mining_reward: 700,
        gas_price: 2,
        balances: senders
            .iter()
            .map(|id| (id.clone(), 10_000u64))
            .collect::<BTreeMap<_, _>>(),
    })
}

fn transfer(key: &SigningKey, nonce: u64, value: u64, tip: u64) -> BlockTx {
    let tx = Tx {
        chain_id: 1,
        nonce,
        from_id: account_of(key),
        to_id: AccountId::from_bytes([0x22; 20]),
        value,
        tip,
        data: Vec::new(),
    };
    BlockTx::new(SignedTx::sign(tx, key).expect("sign"), 2, 1)
}

fn block_with(txs: Vec<BlockTx>) -> Block {
    Block::new(
        BlockHeader {
            number: 1,
            prev_block_hash: ZERO_HASH.to_string(),
            timestamp: 1_700_000_000,
            beneficiary_id: AccountId::from_bytes([0x33; 20]),
            difficulty: 1,
            mining_reward: 700,
            state_root: ZERO_HASH.to_string(),
            trans_root: ZERO_HASH.to_string(),
            nonce: 0,
        },
        txs,
    )
}

prop_compose! {
    fn arb_transfers()(entries in prop::collection::vec(
        (0u8..2, 1u64..200, 0u64..20),
        1..12,
    )) -> Vec<(u8, u64, u64)> {
        entries
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    fn block_application_is_deterministic(entries in arb_transfers()) {
        let keys = [signing_key(1), signing_key(2)];
        let senders = [account_of(&keys[0]), account_of(&keys[1])];

        let mut nonces = [0u64; 2];
        let mut txs = Vec::new();
        for (who, value, tip) in entries {
            let who = usize::from(who);
            nonces[who] += 1;
            txs.push(transfer(&keys[who], nonces[who], value, tip));
        }
        let block = block_with(txs);

        let first = Ledger::new(seeded_genesis(&senders));
        first.apply_block(&block);
        let second = Ledger::new(seeded_genesis(&senders));
        second.apply_block(&block);

        prop_assert_eq!(first.state_hash(), second.state_hash());

        // Every transfer fits in the genesis balance, so each sender's
        // nonce lands exactly on its last transaction.
        for (index, sender) in senders.iter().enumerate() {
            let account = first.query(sender).expect("sender account");
            prop_assert_eq!(account.nonce, nonces[index]);
        }
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    fn balances_are_conserved_plus_reward(entries in arb_transfers()) {
        let keys = [signing_key(1), signing_key(2)];
        let senders = [account_of(&keys[0]), account_of(&keys[1])];

        let mut nonces = [0u64; 2];
        let mut txs = Vec::new();
        for (who, value, tip) in entries {
            let who = usize::from(who);
            nonces[who] += 1;
            txs.push(transfer(&keys[who], nonces[who], value, tip));
        }
        let block = block_with(txs);

        let ledger = Ledger::new(seeded_genesis(&senders));
        let initial: u64 = ledger
            .copy_accounts()
            .values()
            .map(|account| account.balance)
            .sum();
        ledger.apply_block(&block);
        let total: u64 = ledger
            .copy_accounts()
            .values()
            .map(|account| account.balance)
            .sum();

        prop_assert_eq!(total, initial + 700);
    }
}
