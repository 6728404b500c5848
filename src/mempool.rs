//! Pending-transaction cache keyed by sender and nonce, with pluggable
//! selection strategies for block construction.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::errors::{ChainError, ChainResult};
use crate::types::{AccountId, BlockTx};

pub const STRATEGY_TIP: &str = "tip";
pub const STRATEGY_TIP_ADVANCED: &str = "tip_advanced";

type SelectorFn = fn(HashMap<AccountId, Vec<BlockTx>>, usize) -> Vec<BlockTx>;

pub struct Mempool {
    pool: RwLock<HashMap<String, BlockTx>>,
    selector: SelectorFn,
}

impl Mempool {
    pub fn new() -> Self {
        Self {
            pool: RwLock::new(HashMap::new()),
            selector: tip_select,
        }
    }

    /// Constructs a mempool with the named selection strategy; unknown
    /// names fail here rather than at selection time.
    pub fn with_strategy(strategy: &str) -> ChainResult<Self> {
        let selector = match strategy.to_ascii_lowercase().as_str() {
            STRATEGY_TIP => tip_select as SelectorFn,
            STRATEGY_TIP_ADVANCED => advanced_tip_select as SelectorFn,
            other => {
                return Err(ChainError::Config(format!(
                    "unknown select strategy {other:?}"
                )))
            }
        };
        Ok(Self {
            pool: RwLock::new(HashMap::new()),
            selector,
        })
    }

    /// Adds or replaces the entry for the transaction's (sender, nonce)
    /// slot and returns the resulting pool size.
    pub fn upsert(&self, tx: BlockTx) -> usize {
        let mut pool = self.pool.write();
        pool.insert(Self::map_key(&tx), tx);
        pool.len()
    }

    pub fn delete(&self, tx: &BlockTx) {
        self.pool.write().remove(&Self::map_key(tx));
    }

    pub fn count(&self) -> usize {
        self.pool.read().len()
    }

    /// All pending transactions in arbitrary order.
    pub fn copy(&self) -> Vec<BlockTx> {
        self.pool.read().values().cloned().collect()
    }

    /// Selects up to `how_many` transactions with the configured strategy.
    /// Every strategy emits a sender's transactions in ascending nonce
    /// order.
    pub fn pick_best(&self, how_many: usize) -> Vec<BlockTx> {
        let mut grouped: HashMap<AccountId, Vec<BlockTx>> = HashMap::new();
        for tx in self.pool.read().values() {
            grouped
                .entry(tx.signed.tx.from_id.clone())
                .or_default()
                .push(tx.clone());
        }
        (self.selector)(grouped, how_many)
    }

    fn map_key(tx: &BlockTx) -> String {
        format!("{}:{}", tx.signed.tx.from_id, tx.signed.tx.nonce)
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

/// Row-based tip selection. Row `i` holds each sender's `i`-th pending
/// transaction; rows are concatenated in order, each emitted in tip order,
/// and only the final row that would push past the limit is re-sorted by
/// tip descending and truncated, so the leftover slots go to the highest
/// tips available. Nonce order per sender is preserved by the row walk.
fn tip_select(mut grouped: HashMap<AccountId, Vec<BlockTx>>, how_many: usize) -> Vec<BlockTx> {
    for txs in grouped.values_mut() {
        txs.sort_by_key(|tx| tx.signed.tx.nonce);
    }

    let mut rows: Vec<Vec<BlockTx>> = Vec::new();
    loop {
        let mut row = Vec::new();
        for txs in grouped.values_mut() {
            if !txs.is_empty() {
                row.push(txs.remove(0));
            }
        }
        if row.is_empty() {
            break;
        }
        row.sort_by_key(|tx| tx.signed.tx.tip);
        rows.push(row);
    }

    let mut selected = Vec::new();
    for mut row in rows {
        let need = how_many.saturating_sub(selected.len());
        if need == 0 {
            break;
        }
        if row.len() > need {
            row.sort_by(|a, b| b.signed.tx.tip.cmp(&a.signed.tx.tip));
            row.truncate(need);
            selected.extend(row);
            break;
        }
        selected.extend(row);
    }
    selected
}

/// Exhaustive tip selection. Considers every way of taking a nonce-prefix
/// from each sender and keeps the combination with the highest total tip,
/// so a high-tip transaction stuck behind a cheap low-nonce one can still
/// pull its sender's queue into the block. Ties prefer more transactions.
fn advanced_tip_select(
    mut grouped: HashMap<AccountId, Vec<BlockTx>>,
    how_many: usize,
) -> Vec<BlockTx> {
    for txs in grouped.values_mut() {
        txs.sort_by_key(|tx| tx.signed.tx.nonce);
    }
    let mut groups: Vec<(AccountId, Vec<BlockTx>)> = grouped.into_iter().collect();
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    let prefix_tips: Vec<Vec<u64>> = groups
        .iter()
        .map(|(_, txs)| {
            let mut sums = vec![0u64];
            for tx in txs.iter().take(how_many) {
                let last = *sums.last().unwrap_or(&0);
                sums.push(last.saturating_add(tx.signed.tx.tip));
            }
            sums
        })
        .collect();

    let mut best_counts = vec![0usize; groups.len()];
    let mut best = (0u64, 0usize);
    let mut counts = vec![0usize; groups.len()];
    search_prefixes(
        &prefix_tips,
        how_many,
        0,
        0,
        0,
        &mut counts,
        &mut best,
        &mut best_counts,
    );

    let mut selected = Vec::new();
    for ((_, txs), count) in groups.into_iter().zip(best_counts) {
        selected.extend(txs.into_iter().take(count));
    }
    selected
}

#[allow(clippy::too_many_arguments)]
fn search_prefixes(
    prefix_tips: &[Vec<u64>],
    left: usize,
    group: usize,
    tip: u64,
    taken: usize,
    counts: &mut Vec<usize>,
    best: &mut (u64, usize),
    best_counts: &mut Vec<usize>,
) {
    if tip > best.0 || (tip == best.0 && taken > best.1) {
        *best = (tip, taken);
        best_counts.clone_from(counts);
    }
    if group >= prefix_tips.len() {
        return;
    }
    for take in 0..prefix_tips[group].len().min(left + 1) {
        counts[group] = take;
        search_prefixes(
            prefix_tips,
            left - take,
            group + 1,
            tip.saturating_add(prefix_tips[group][take]),
            taken + take,
            counts,
            best,
            best_counts,
        );
    }
    counts[group] = 0;
}

#[cfg(test)]
mod tests_prop;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_key;
    use crate::types::{SignedTx, Tx};
    use k256::ecdsa::SigningKey;

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).expect("key")
    }

    fn pending(key: &SigningKey, nonce: u64, tip: u64) -> BlockTx {
        let from = address_from_key(key.verifying_key());
        let tx = Tx {
            chain_id: 1,
            nonce,
            from_id: from,
            to_id: AccountId::from_bytes([0x22; 20]),
            value: 10,
            tip,
            data: Vec::new(),
        };
        BlockTx::new(SignedTx::sign(tx, key).expect("sign"), 1, 1)
    }

    fn sender_of(tx: &BlockTx) -> AccountId {
        tx.signed.tx.from_id.clone()
    }

    fn assert_nonce_order(selected: &[BlockTx]) {
        let mut last_nonce: HashMap<AccountId, u64> = HashMap::new();
        for tx in selected {
            let sender = sender_of(tx);
            if let Some(last) = last_nonce.get(&sender) {
                assert!(
                    tx.signed.tx.nonce > *last,
                    "nonce order violated for {sender}"
                );
            }
            last_nonce.insert(sender, tx.signed.tx.nonce);
        }
    }

    #[test]
    fn unknown_strategy_fails_construction() {
        assert!(matches!(
            Mempool::with_strategy("cheapest"),
            Err(ChainError::Config(_))
        ));
    }

    #[test]
    fn upsert_replaces_same_sender_nonce() {
        let key = signing_key(1);
        let pool = Mempool::new();
        assert_eq!(pool.upsert(pending(&key, 1, 5)), 1);
        assert_eq!(pool.upsert(pending(&key, 1, 50)), 1);
        assert_eq!(pool.count(), 1);
        assert_eq!(pool.copy()[0].signed.tx.tip, 50);
    }

    #[test]
    fn delete_removes_the_slot() {
        let key = signing_key(1);
        let pool = Mempool::new();
        let tx = pending(&key, 1, 5);
        pool.upsert(tx.clone());
        pool.delete(&tx);
        assert_eq!(pool.count(), 0);
        pool.delete(&tx);
        assert_eq!(pool.count(), 0);
    }

    #[test]
    fn pick_best_zero_returns_nothing() {
        let key = signing_key(1);
        let pool = Mempool::new();
        pool.upsert(pending(&key, 1, 5));
        assert!(pool.pick_best(0).is_empty());
    }

    #[test]
    fn pick_best_caps_at_pool_size() {
        let key = signing_key(1);
        let pool = Mempool::new();
        pool.upsert(pending(&key, 1, 5));
        pool.upsert(pending(&key, 2, 5));
        assert_eq!(pool.pick_best(10).len(), 2);
    }

    #[test]
    fn tip_strategy_orders_rows_by_tip_under_nonce_constraint() {
        let x = signing_key(1);
        let y = signing_key(2);
        let pool = Mempool::new();
        let x1 = pending(&x, 1, 1);
        let x2 = pending(&x, 2, 100);
        let y1 = pending(&y, 1, 50);
        pool.upsert(x1.clone());
        pool.upsert(x2.clone());
        pool.upsert(y1.clone());

        // Row one fits in full, so it keeps its tip order; x's second-nonce
        // transaction cannot jump ahead of it no matter how high its tip.
        let two = pool.pick_best(2);
        assert_eq!(two, vec![x1.clone(), y1.clone()]);
        assert_nonce_order(&two);

        let three = pool.pick_best(3);
        assert_eq!(three, vec![x1, y1, x2]);
        assert_nonce_order(&three);
    }

    #[test]
    fn tip_strategy_overflowing_row_yields_highest_tips() {
        let x = signing_key(1);
        let y = signing_key(2);
        let z = signing_key(3);
        let pool = Mempool::new();
        let x1 = pending(&x, 1, 1);
        let y1 = pending(&y, 1, 50);
        let z1 = pending(&z, 1, 100);
        pool.upsert(x1.clone());
        pool.upsert(y1.clone());
        pool.upsert(z1.clone());

        let two = pool.pick_best(2);
        assert_eq!(two, vec![z1, y1]);
        assert!(!two.contains(&x1));
    }

    #[test]
    fn advanced_strategy_frees_stuck_high_tips() {
        let x = signing_key(1);
        let y = signing_key(2);
        let pool = Mempool::with_strategy(STRATEGY_TIP_ADVANCED).unwrap();
        let x1 = pending(&x, 1, 1);
        let x2 = pending(&x, 2, 100);
        let y1 = pending(&y, 1, 50);
        pool.upsert(x1.clone());
        pool.upsert(x2.clone());
        pool.upsert(y1.clone());

        // Taking both of x's transactions (101 total) beats any pair that
        // includes y (at most 51).
        let two = pool.pick_best(2);
        assert_eq!(two, vec![x1.clone(), x2.clone()]);
        assert_nonce_order(&two);

        let three = pool.pick_best(3);
        assert_eq!(three.len(), 3);
        assert_nonce_order(&three);
    }

    #[test]
    fn advanced_strategy_fills_blocks_when_tips_are_zero() {
        let x = signing_key(1);
        let pool = Mempool::with_strategy(STRATEGY_TIP_ADVANCED).unwrap();
        pool.upsert(pending(&x, 1, 0));
        pool.upsert(pending(&x, 2, 0));
        let picked = pool.pick_best(2);
        assert_eq!(picked.len(), 2);
        assert_nonce_order(&picked);
    }
}
