use std::time::{SystemTime, UNIX_EPOCH};

mod account;
mod block;
mod peer;
mod transaction;

pub use account::{Account, AccountId};
pub use block::{Block, BlockData, BlockHeader};
pub use peer::{Peer, PeerStatus};
pub use transaction::{BlockTx, SignedTx, Tx};

/// Current wall-clock time in whole seconds since the Unix epoch.
pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
