//! HTTP surface of the node: a public router for wallets and viewers, and a
//! private router for node-to-node traffic. Handlers are thin adapters over
//! [`Node`]; all business rules live behind it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::errors::{ChainError, ChainResult};
use crate::nameservice::NameService;
use crate::node::{Node, QUERY_LATEST};
use crate::types::{AccountId, Block, BlockData, BlockTx, Peer, PeerStatus, SignedTx};

#[derive(Clone)]
struct AppState {
    node: Node,
    names: Arc<NameService>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct AccountInfo {
    account: AccountId,
    name: String,
    balance: u64,
    nonce: u64,
}

#[derive(Serialize)]
struct AccountsResponse {
    uncommitted: usize,
    accounts: Vec<AccountInfo>,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Serves wallet and viewer traffic.
pub async fn serve_public(
    node: Node,
    names: Arc<NameService>,
    addr: SocketAddr,
) -> ChainResult<()> {
    let state = AppState { node, names };
    let router = Router::new()
        .route("/v1/genesis/list", get(genesis_list))
        .route("/v1/accounts/list", get(accounts_list))
        .route("/v1/accounts/list/:id", get(account_by_id))
        .route("/v1/tx/uncommitted/list", get(uncommitted_list))
        .route("/v1/tx/uncommitted/list/:id", get(uncommitted_by_id))
        .route("/v1/blocks/list", get(blocks_list))
        .route("/v1/blocks/list/:id", get(blocks_by_account))
        .route("/v1/tx/submit", post(submit_wallet_tx))
        .route("/v1/events", get(events))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "public API listening");
    axum::serve(listener, router)
        .await
        .map_err(|err| ChainError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))
}

/// Serves node-to-node traffic.
pub async fn serve_private(node: Node, addr: SocketAddr) -> ChainResult<()> {
    let state = AppState {
        node,
        names: Arc::new(NameService::empty()),
    };
    let router = Router::new()
        .route("/v1/node/status", get(node_status))
        .route("/v1/node/block/list/:from/:to", get(node_blocks_by_number))
        .route("/v1/node/block/next", post(propose_block))
        .route("/v1/node/tx/submit", post(submit_node_tx))
        .route("/v1/node/peers", post(add_peer))
        .route("/v1/node/tx/list", get(node_tx_list))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "private API listening");
    axum::serve(listener, router)
        .await
        .map_err(|err| ChainError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))
}

// -------------------------------------------------------------------------
// Public handlers

async fn genesis_list(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.node.genesis().clone())
}

async fn accounts_list(State(state): State<AppState>) -> Json<AccountsResponse> {
    let accounts = state
        .node
        .accounts()
        .into_values()
        .map(|account| AccountInfo {
            name: state.names.lookup(&account.account_id),
            account: account.account_id,
            balance: account.balance,
            nonce: account.nonce,
        })
        .collect();
    Json(AccountsResponse {
        uncommitted: state.node.mempool_count(),
        accounts,
    })
}

async fn account_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccountsResponse>, HandlerError> {
    let account_id = parse_account(&id)?;
    let account = state.node.query_account(&account_id).map_err(to_http_error)?;
    Ok(Json(AccountsResponse {
        uncommitted: state.node.mempool_count(),
        accounts: vec![AccountInfo {
            name: state.names.lookup(&account.account_id),
            account: account.account_id,
            balance: account.balance,
            nonce: account.nonce,
        }],
    }))
}

async fn uncommitted_list(State(state): State<AppState>) -> Response {
    list_or_no_content(state.node.mempool())
}

async fn uncommitted_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, HandlerError> {
    let account_id = parse_account(&id)?;
    let txs: Vec<BlockTx> = state
        .node
        .mempool()
        .into_iter()
        .filter(|tx| {
            tx.signed.tx.from_id == account_id || tx.signed.tx.to_id == account_id
        })
        .collect();
    Ok(list_or_no_content(txs))
}

async fn blocks_list(State(state): State<AppState>) -> Response {
    let blocks: Vec<BlockData> = state
        .node
        .query_blocks_by_account(None)
        .iter()
        .map(BlockData::from)
        .collect();
    list_or_no_content(blocks)
}

async fn blocks_by_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, HandlerError> {
    let account_id = parse_account(&id)?;
    let blocks: Vec<BlockData> = state
        .node
        .query_blocks_by_account(Some(&account_id))
        .iter()
        .map(BlockData::from)
        .collect();
    Ok(list_or_no_content(blocks))
}

async fn submit_wallet_tx(
    State(state): State<AppState>,
    Json(signed): Json<SignedTx>,
) -> Result<Json<StatusResponse>, HandlerError> {
    debug!(tx = %signed, "wallet transaction received");
    state
        .node
        .upsert_wallet_transaction(signed)
        .map_err(to_http_error)?;
    Ok(Json(StatusResponse {
        status: "transactions added to mempool",
    }))
}

async fn events(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| stream_events(socket, state))
}

/// Forwards node events as text frames and keeps the connection alive with
/// a ping every second.
async fn stream_events(mut socket: WebSocket, state: AppState) {
    let mut receiver = state.node.events().subscribe();
    let mut ping = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Ok(event) => {
                    if socket.send(Message::Text(event)).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = ping.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}

// -------------------------------------------------------------------------
// Private handlers

async fn node_status(State(state): State<AppState>) -> Json<PeerStatus> {
    let latest = state.node.latest_block();
    Json(PeerStatus {
        latest_block_hash: latest.hash(),
        latest_block_number: latest.header.number,
        known_peers: state.node.known_external_peers(),
    })
}

async fn node_blocks_by_number(
    State(state): State<AppState>,
    Path((from, to)): Path<(String, String)>,
) -> Result<Response, HandlerError> {
    let from = parse_block_number(&from)?;
    let to = parse_block_number(&to)?;
    if from > to && to != QUERY_LATEST {
        return Err(bad_request("from greater than to"));
    }
    let blocks: Vec<BlockData> = state
        .node
        .query_blocks_by_number(from, to)
        .iter()
        .map(BlockData::from)
        .collect();
    Ok(list_or_no_content(blocks))
}

async fn propose_block(
    State(state): State<AppState>,
    Json(data): Json<BlockData>,
) -> Result<Json<StatusResponse>, HandlerError> {
    let block = Block::from(data);
    match state.node.process_proposed_block(&block) {
        Ok(()) => Ok(Json(StatusResponse { status: "accepted" })),
        Err(ChainError::ChainForked) => {
            warn!("proposed block revealed a fork, resyncing");
            if let Err(err) = state.node.resync() {
                warn!(error = %err, "resync failed to start");
            }
            Err(not_acceptable())
        }
        Err(err) => {
            debug!(error = %err, "proposed block rejected");
            Err(not_acceptable())
        }
    }
}

async fn submit_node_tx(
    State(state): State<AppState>,
    Json(tx): Json<BlockTx>,
) -> Result<Json<StatusResponse>, HandlerError> {
    debug!(tx = %tx, "node transaction received");
    state
        .node
        .upsert_node_transaction(tx)
        .map_err(to_http_error)?;
    Ok(Json(StatusResponse {
        status: "transactions added to mempool",
    }))
}

async fn add_peer(
    State(state): State<AppState>,
    Json(peer): Json<Peer>,
) -> Json<StatusResponse> {
    if state.node.add_known_peer(peer.clone()) {
        info!(peer = %peer, "peer announced itself");
    }
    Json(StatusResponse { status: "accepted" })
}

async fn node_tx_list(State(state): State<AppState>) -> Response {
    list_or_no_content(state.node.mempool())
}

// -------------------------------------------------------------------------
// Helpers

fn list_or_no_content<T: Serialize>(items: Vec<T>) -> Response {
    if items.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(items).into_response()
}

fn parse_account(raw: &str) -> Result<AccountId, HandlerError> {
    AccountId::from_hex(raw).map_err(to_http_error)
}

fn parse_block_number(raw: &str) -> Result<u64, HandlerError> {
    if raw == "latest" || raw.is_empty() {
        return Ok(QUERY_LATEST);
    }
    raw.parse()
        .map_err(|_| bad_request("invalid block number"))
}

fn bad_request(message: &str) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn not_acceptable() -> HandlerError {
    (
        StatusCode::NOT_ACCEPTABLE,
        Json(ErrorResponse {
            error: "block not accepted".to_string(),
        }),
    )
}

fn to_http_error(err: ChainError) -> HandlerError {
    let status = match err {
        ChainError::InvalidSignature
        | ChainError::BadAddress(_)
        | ChainError::WrongChain
        | ChainError::SelfTransfer
        | ChainError::NonceTooSmall { .. }
        | ChainError::InsufficientFunds
        | ChainError::NoTransactions
        | ChainError::Config(_)
        | ChainError::Serialization(_) => StatusCode::BAD_REQUEST,
        ChainError::NotFound => StatusCode::NOT_FOUND,
        ChainError::ChainForked | ChainError::InvalidBlock(_) => StatusCode::NOT_ACCEPTABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
