use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{ChainError, ChainResult};

/// Consensus scheme the worker runs. Selected at startup, immutable after.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Consensus {
    Pow,
    Poa,
}

impl FromStr for Consensus {
    type Err = ChainError;

    fn from_str(value: &str) -> ChainResult<Self> {
        match value.to_ascii_uppercase().as_str() {
            "POW" => Ok(Consensus::Pow),
            "POA" => Ok(Consensus::Poa),
            other => Err(ChainError::Config(format!(
                "unknown consensus {other:?}, expected POW or POA"
            ))),
        }
    }
}

impl fmt::Display for Consensus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consensus::Pow => f.write_str("POW"),
            Consensus::Poa => f.write_str("POA"),
        }
    }
}

/// Node configuration, read from the environment with the `NODE_` prefix.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Listen address for wallet and viewer traffic.
    pub public_host: String,
    /// Listen address for node-to-node traffic; doubles as this node's
    /// identity in the peer mesh.
    pub private_host: String,
    /// Name of the account credited with mining rewards; its key file is
    /// `<name_service_folder>/<name>.ecdsa`.
    pub beneficiary: String,
    pub db_path: PathBuf,
    pub select_strategy: String,
    pub origin_peers: Vec<String>,
    pub consensus: Consensus,
    pub name_service_folder: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            public_host: "0.0.0.0:8080".to_string(),
            private_host: "0.0.0.0:9080".to_string(),
            beneficiary: "miner1".to_string(),
            db_path: PathBuf::from("zblock/miner1"),
            select_strategy: "tip".to_string(),
            origin_peers: Vec::new(),
            consensus: Consensus::Pow,
            name_service_folder: PathBuf::from("zblock/accounts"),
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> ChainResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ChainResult<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup("NODE_WEB_PUBLIC_HOST") {
            config.public_host = value;
        }
        if let Some(value) = lookup("NODE_WEB_PRIVATE_HOST") {
            config.private_host = value;
        }
        if let Some(value) = lookup("NODE_STATE_BENEFICIARY") {
            config.beneficiary = value;
        }
        if let Some(value) = lookup("NODE_STATE_DB_PATH") {
            config.db_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("NODE_STATE_SELECT_STRATEGY") {
            config.select_strategy = value;
        }
        if let Some(value) = lookup("NODE_STATE_ORIGIN_PEERS") {
            config.origin_peers = value
                .split(',')
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("NODE_STATE_CONSENSUS") {
            config.consensus = value.parse()?;
        }
        if let Some(value) = lookup("NODE_NAME_SERVICE_FOLDER") {
            config.name_service_folder = PathBuf::from(value);
        }
        config.public_addr()?;
        config.private_addr()?;
        Ok(config)
    }

    pub fn public_addr(&self) -> ChainResult<SocketAddr> {
        self.public_host.parse().map_err(|err| {
            ChainError::Config(format!(
                "invalid public host {:?}: {err}",
                self.public_host
            ))
        })
    }

    pub fn private_addr(&self) -> ChainResult<SocketAddr> {
        self.private_host.parse().map_err(|err| {
            ChainError::Config(format!(
                "invalid private host {:?}: {err}",
                self.private_host
            ))
        })
    }

    pub fn key_path(&self) -> PathBuf {
        self.name_service_folder
            .join(format!("{}.ecdsa", self.beneficiary))
    }
}
