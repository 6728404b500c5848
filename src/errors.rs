use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid account address: {0}")]
    BadAddress(String),
    #[error("transaction chain id does not match the node chain id")]
    WrongChain,
    #[error("transaction sends value to its own sender")]
    SelfTransfer,
    #[error("nonce too small, last {last}, got {got}")]
    NonceTooSmall { last: u64, got: u64 },
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("no transactions in mempool")]
    NoTransactions,
    #[error("blockchain forked, resync required")]
    ChainForked,
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    #[error("not found")]
    NotFound,
    #[error("corrupted data: {0}")]
    Corrupted(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ChainResult<T> = Result<T, ChainError>;
