//! HTTP client for the node-to-node surface exposed by peers under
//! `/v1/node`. Every call carries a request timeout so a dead peer cannot
//! stall the worker.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{ChainError, ChainResult};
use crate::types::{BlockData, BlockTx, Peer, PeerStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct PeerClient {
    client: Client,
}

impl PeerClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("building http client");
        Self { client }
    }

    pub async fn status(&self, peer: &Peer) -> ChainResult<PeerStatus> {
        let status: Option<PeerStatus> = self
            .get_json(&format!("{}/status", Self::base(peer)))
            .await?;
        Ok(status.unwrap_or_default())
    }

    pub async fn mempool(&self, peer: &Peer) -> ChainResult<Vec<BlockTx>> {
        let pool: Option<Vec<BlockTx>> = self
            .get_json(&format!("{}/tx/list", Self::base(peer)))
            .await?;
        Ok(pool.unwrap_or_default())
    }

    /// Blocks from `from` up to the peer's latest, inclusive.
    pub async fn blocks_from(&self, peer: &Peer, from: u64) -> ChainResult<Vec<BlockData>> {
        let blocks: Option<Vec<BlockData>> = self
            .get_json(&format!("{}/block/list/{from}/latest", Self::base(peer)))
            .await?;
        Ok(blocks.unwrap_or_default())
    }

    pub async fn submit_tx(&self, peer: &Peer, tx: &BlockTx) -> ChainResult<()> {
        self.post_json(&format!("{}/tx/submit", Self::base(peer)), tx)
            .await
    }

    pub async fn propose_block(&self, peer: &Peer, data: &BlockData) -> ChainResult<()> {
        self.post_json(&format!("{}/block/next", Self::base(peer)), data)
            .await
    }

    /// Tells the peer this node is available to participate.
    pub async fn announce(&self, peer: &Peer, me: &Peer) -> ChainResult<()> {
        self.post_json(&format!("{}/peers", Self::base(peer)), me)
            .await
    }

    fn base(peer: &Peer) -> String {
        format!("http://{}/v1/node", peer.host)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ChainResult<Option<T>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ChainError::Network(err.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> ChainResult<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| ChainError::Network(err.to_string()))?;
        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ChainResult<Option<T>> {
        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let value = response
                    .json()
                    .await
                    .map_err(|err| ChainError::Network(err.to_string()))?;
                Ok(Some(value))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ChainError::Network(format!("{status}: {body}")))
            }
        }
    }
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new()
    }
}
