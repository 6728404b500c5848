use serde::{Deserialize, Serialize};

use crate::crypto::{self, ZERO_HASH};
use crate::errors::{ChainError, ChainResult};
use crate::merkle::Tree;
use crate::pow::is_hash_solved;

use super::{AccountId, BlockTx};

/// Header of a block. The block hash is the hash of this header only, so
/// the chain can be validated from headers without the transaction bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub prev_block_hash: String,
    pub timestamp: u64,
    #[serde(rename = "beneficiary")]
    pub beneficiary_id: AccountId,
    pub difficulty: u16,
    pub mining_reward: u64,
    pub state_root: String,
    pub trans_root: String,
    pub nonce: u64,
}

/// A sealed group of transactions chained to its parent by hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    txs: Vec<BlockTx>,
}

impl Block {
    pub fn new(header: BlockHeader, txs: Vec<BlockTx>) -> Self {
        Self { header, txs }
    }

    /// The pre-genesis block every chain starts from. It only exists in
    /// memory; its hash is the zero hash and nothing validates against its
    /// roots.
    pub fn sentinel() -> Self {
        Self {
            header: BlockHeader {
                number: 0,
                prev_block_hash: ZERO_HASH.to_string(),
                timestamp: 0,
                beneficiary_id: AccountId::from_bytes([0u8; 20]),
                difficulty: 0,
                mining_reward: 0,
                state_root: ZERO_HASH.to_string(),
                trans_root: ZERO_HASH.to_string(),
                nonce: 0,
            },
            txs: Vec::new(),
        }
    }

    pub fn txs(&self) -> &[BlockTx] {
        &self.txs
    }

    pub fn hash(&self) -> String {
        if self.header.number == 0 {
            return ZERO_HASH.to_string();
        }
        crypto::hash(&self.header)
    }

    pub fn merkle_tree(&self) -> ChainResult<Tree<BlockTx>> {
        Tree::new(self.txs.clone())
    }

    /// Validates this block as the successor of `prev`, in the fixed order
    /// the consensus rules prescribe. The first failed check decides the
    /// error; a number two or more ahead of the local chain is a fork, which
    /// callers treat as a resync trigger rather than a bad block.
    pub fn validate(&self, prev: &Block, expected_state_root: &str) -> ChainResult<()> {
        let next_number = prev.header.number + 1;

        if self.header.number > next_number {
            return Err(ChainError::ChainForked);
        }

        if self.header.difficulty < prev.header.difficulty {
            return Err(ChainError::InvalidBlock(format!(
                "difficulty below parent, parent {}, block {}",
                prev.header.difficulty, self.header.difficulty
            )));
        }

        let hash = self.hash();
        if !is_hash_solved(self.header.difficulty, &hash) {
            return Err(ChainError::InvalidBlock(format!(
                "hash {hash} does not satisfy difficulty {}",
                self.header.difficulty
            )));
        }

        if self.header.number != next_number {
            return Err(ChainError::InvalidBlock(format!(
                "block number out of order, got {}, exp {next_number}",
                self.header.number
            )));
        }

        let prev_hash = prev.hash();
        if self.header.prev_block_hash != prev_hash {
            return Err(ChainError::InvalidBlock(format!(
                "parent hash mismatch, got {}, exp {prev_hash}",
                self.header.prev_block_hash
            )));
        }

        if prev.header.timestamp > 0 && self.header.timestamp <= prev.header.timestamp {
            return Err(ChainError::InvalidBlock(format!(
                "timestamp not after parent, parent {}, block {}",
                prev.header.timestamp, self.header.timestamp
            )));
        }

        let trans_root = self.merkle_tree()?.root_hex();
        if self.header.trans_root != trans_root {
            return Err(ChainError::InvalidBlock(format!(
                "transaction root mismatch, got {}, exp {trans_root}",
                self.header.trans_root
            )));
        }

        if self.header.state_root != expected_state_root {
            return Err(ChainError::InvalidBlock(format!(
                "state root mismatch, got {}, exp {expected_state_root}",
                self.header.state_root
            )));
        }

        Ok(())
    }
}

/// The serialized form of a block as written to disk and sent to peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    pub hash: String,
    pub header: BlockHeader,
    pub txs: Vec<BlockTx>,
}

impl From<&Block> for BlockData {
    fn from(block: &Block) -> Self {
        Self {
            hash: block.hash(),
            header: block.header.clone(),
            txs: block.txs.clone(),
        }
    }
}

impl From<BlockData> for Block {
    fn from(data: BlockData) -> Self {
        Block::new(data.header, data.txs)
    }
}
