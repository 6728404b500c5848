//! In-memory account database. State is derived entirely by replaying the
//! block store from genesis, so a node can always rebuild itself from disk.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::crypto;
use crate::errors::{ChainError, ChainResult};
use crate::genesis::Genesis;
use crate::store::BlockStore;
use crate::types::{Account, AccountId, Block, BlockTx};

pub struct Ledger {
    genesis: Arc<Genesis>,
    accounts: RwLock<HashMap<AccountId, Account>>,
    latest_block: RwLock<Block>,
}

impl Ledger {
    /// Fresh ledger seeded with the genesis balances and no blocks.
    pub fn new(genesis: Arc<Genesis>) -> Self {
        let ledger = Self {
            genesis,
            accounts: RwLock::new(HashMap::new()),
            latest_block: RwLock::new(Block::sentinel()),
        };
        ledger.seed_genesis_balances();
        ledger
    }

    /// Rebuilds account state by replaying every persisted block in order,
    /// validating each against the running chain tip and state hash.
    pub fn load(genesis: Arc<Genesis>, store: &BlockStore) -> ChainResult<Self> {
        let ledger = Self::new(genesis);
        for data in store.iter() {
            let block = Block::from(data?);
            block.validate(&ledger.latest_block(), &ledger.state_hash())?;
            ledger.apply_block(&block);
        }
        Ok(ledger)
    }

    /// Applies every transaction of the block, then the mining reward, then
    /// advances the chain tip. Individual transaction failures are logged
    /// and skipped: the gas debit has already punished the sender, and one
    /// bad transaction must not halt the block.
    pub fn apply_block(&self, block: &Block) {
        for tx in block.txs() {
            if let Err(err) = self.apply_tx(block, tx) {
                warn!(tx = %tx, error = %err, "skipping transaction during block application");
            }
        }
        self.apply_mining_reward(block);
        self.set_latest_block(block.clone());
    }

    /// Applies a single transaction. The gas fee is debited from the sender
    /// and credited to the beneficiary before any semantic check runs, and
    /// is not rolled back when a later check fails. That is the anti-spam
    /// contract: every accepted-into-a-block transaction costs its sender
    /// gas, valid or not.
    pub fn apply_tx(&self, block: &Block, tx: &BlockTx) -> ChainResult<()> {
        let from_id = tx.from_account()?;
        let beneficiary_id = block.header.beneficiary_id.clone();
        let mut accounts = self.accounts.write();

        let gas = {
            let from = accounts
                .entry(from_id.clone())
                .or_insert_with(|| Account::new(from_id.clone()));
            let gas = tx.gas_fee().min(from.balance);
            from.balance -= gas;
            gas
        };
        {
            let miner = accounts
                .entry(beneficiary_id.clone())
                .or_insert_with(|| Account::new(beneficiary_id.clone()));
            miner.balance = miner.balance.saturating_add(gas);
        }

        if tx.signed.tx.chain_id != self.genesis.chain_id {
            return Err(ChainError::WrongChain);
        }
        if from_id == tx.signed.tx.to_id {
            return Err(ChainError::SelfTransfer);
        }

        let (from_balance, from_nonce) = accounts
            .get(&from_id)
            .map(|account| (account.balance, account.nonce))
            .unwrap_or((0, 0));
        if tx.signed.tx.nonce <= from_nonce {
            return Err(ChainError::NonceTooSmall {
                last: from_nonce,
                got: tx.signed.tx.nonce,
            });
        }
        let total = tx
            .signed
            .tx
            .value
            .checked_add(tx.signed.tx.tip)
            .ok_or(ChainError::InsufficientFunds)?;
        if from_balance < total {
            return Err(ChainError::InsufficientFunds);
        }

        {
            let from = accounts
                .entry(from_id.clone())
                .or_insert_with(|| Account::new(from_id.clone()));
            from.balance -= total;
            from.nonce = tx.signed.tx.nonce;
        }
        {
            let to_id = tx.signed.tx.to_id.clone();
            let to = accounts
                .entry(to_id.clone())
                .or_insert_with(|| Account::new(to_id));
            to.balance = to.balance.saturating_add(tx.signed.tx.value);
        }
        {
            let miner = accounts
                .entry(beneficiary_id.clone())
                .or_insert_with(|| Account::new(beneficiary_id));
            miner.balance = miner.balance.saturating_add(tx.signed.tx.tip);
        }

        Ok(())
    }

    pub fn apply_mining_reward(&self, block: &Block) {
        let beneficiary_id = block.header.beneficiary_id.clone();
        let mut accounts = self.accounts.write();
        let miner = accounts
            .entry(beneficiary_id.clone())
            .or_insert_with(|| Account::new(beneficiary_id));
        miner.balance = miner.balance.saturating_add(self.genesis.mining_reward);
    }

    /// Content hash of the account set, computed over accounts sorted by id
    /// so every node derives the same root for the same state.
    pub fn state_hash(&self) -> String {
        let mut accounts: Vec<Account> = self.accounts.read().values().cloned().collect();
        accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        crypto::hash(&accounts)
    }

    pub fn copy_accounts(&self) -> HashMap<AccountId, Account> {
        self.accounts.read().clone()
    }

    pub fn query(&self, account_id: &AccountId) -> ChainResult<Account> {
        self.accounts
            .read()
            .get(account_id)
            .cloned()
            .ok_or(ChainError::NotFound)
    }

    pub fn remove(&self, account_id: &AccountId) {
        self.accounts.write().remove(account_id);
    }

    /// Drops all state and reseeds the genesis balances.
    pub fn reset(&self) {
        {
            let mut accounts = self.accounts.write();
            accounts.clear();
        }
        self.seed_genesis_balances();
        *self.latest_block.write() = Block::sentinel();
    }

    pub fn latest_block(&self) -> Block {
        self.latest_block.read().clone()
    }

    pub fn set_latest_block(&self, block: Block) {
        *self.latest_block.write() = block;
    }

    fn seed_genesis_balances(&self) {
        let mut accounts = self.accounts.write();
        for (account_id, balance) in &self.genesis.balances {
            accounts.insert(
                account_id.clone(),
                Account::with_balance(account_id.clone(), *balance),
            );
        }
    }
}

#[cfg(test)]
mod tests_prop;
