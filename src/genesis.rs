use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ChainError, ChainResult};
use crate::types::AccountId;

/// Location of the genesis file relative to the node's working directory.
pub const GENESIS_PATH: &str = "zblock/genesis.json";

/// Immutable chain parameters and initial balances, loaded once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Genesis {
    pub date: String,
    pub chain_id: u16,
    pub difficulty: u16,
    pub trans_per_block: usize,
    pub mining_reward: u64,
    pub gas_price: u64,
    pub balances: BTreeMap<AccountId, u64>,
}

impl Genesis {
    pub fn load() -> ChainResult<Self> {
        Self::load_from(Path::new(GENESIS_PATH))
    }

    pub fn load_from(path: &Path) -> ChainResult<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            ChainError::Config(format!(
                "unable to read genesis file {}: {err}",
                path.display()
            ))
        })?;
        serde_json::from_str(&content)
            .map_err(|err| ChainError::Config(format!("unable to parse genesis file: {err}")))
    }
}
