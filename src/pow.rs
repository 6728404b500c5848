//! Proof-of-work block construction: header assembly and the nonce search.
//!
//! The search is a plain hash loop over the header with a wrapping nonce.
//! It runs on a blocking thread and polls its cancellation token every
//! iteration so a peer block can pre-empt it promptly.

use rand::rngs::OsRng;
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::crypto::{self, ZERO_HASH};
use crate::errors::{ChainError, ChainResult};
use crate::merkle::Tree;
use crate::types::{now_unix, AccountId, Block, BlockHeader, BlockTx};

/// Attempt interval between progress log lines while searching.
pub const ATTEMPTS_PER_PROGRESS_LOG: u64 = 1_048_576;

pub struct PowArgs {
    pub beneficiary_id: AccountId,
    pub difficulty: u16,
    pub mining_reward: u64,
    pub prev_block: Block,
    pub state_root: String,
    pub txs: Vec<BlockTx>,
}

/// Builds the candidate block and searches for a nonce whose header hash
/// satisfies the difficulty rule. Fails with [`ChainError::Cancelled`] when
/// the token fires.
pub fn pow(token: &CancellationToken, args: PowArgs) -> ChainResult<Block> {
    let prev_block_hash = if args.prev_block.header.number > 0 {
        args.prev_block.hash()
    } else {
        ZERO_HASH.to_string()
    };

    let tree = Tree::new(args.txs)?;
    let trans_root = tree.root_hex();
    let txs = tree.values().to_vec();

    // Timestamps are whole seconds; a block sealed within the same second
    // as its parent must still advance past it to stay valid.
    let timestamp = now_unix().max(args.prev_block.header.timestamp + 1);

    let mut header = BlockHeader {
        number: args.prev_block.header.number + 1,
        prev_block_hash,
        timestamp,
        beneficiary_id: args.beneficiary_id,
        difficulty: args.difficulty,
        mining_reward: args.mining_reward,
        state_root: args.state_root,
        trans_root,
        nonce: OsRng.next_u64(),
    };

    debug!(
        number = header.number,
        txs = txs.len(),
        difficulty = header.difficulty,
        "mining started"
    );

    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        if attempts % ATTEMPTS_PER_PROGRESS_LOG == 0 {
            debug!(attempts, number = header.number, "mining progress");
        }
        if token.is_cancelled() {
            debug!(attempts, number = header.number, "mining cancelled");
            return Err(ChainError::Cancelled);
        }

        let hash = crypto::hash(&header);
        if is_hash_solved(header.difficulty, &hash) {
            debug!(attempts, hash = %hash, number = header.number, "mining solved");
            return Ok(Block::new(header, txs));
        }
        header.nonce = header.nonce.wrapping_add(1);
    }
}

/// The difficulty rule: the first `difficulty` hex characters of the block
/// hash must be '0'.
pub fn is_hash_solved(difficulty: u16, hash: &str) -> bool {
    if hash.len() != 64 || usize::from(difficulty) > 64 {
        return false;
    }
    hash.bytes().take(usize::from(difficulty)).all(|b| b == b'0')
}
