//! Core crate for the cinder-chain node: an account-based blockchain with
//! pluggable proof-of-work / proof-of-authority consensus.
//!
//! The [`node::Node`] facade owns all chain state — genesis, ledger, block
//! store, mempool, and peer registry — and is the single entry point for
//! mutating it. The [`worker::Worker`] drives participation in the network:
//! mining rounds, peer maintenance, and transaction gossip. The [`api`]
//! module exposes both over HTTP, and [`client`] is the matching outbound
//! side used to talk to peers.
//!
//! Applications typically load a [`config::NodeConfig`] and a
//! [`genesis::Genesis`], construct a [`node::Node`], hand it to
//! [`worker::Worker::run`], and serve [`api::serve_public`] and
//! [`api::serve_private`].

pub mod api;
pub mod client;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod events;
pub mod genesis;
pub mod ledger;
pub mod mempool;
pub mod merkle;
pub mod nameservice;
pub mod node;
pub mod peers;
pub mod pow;
pub mod store;
pub mod types;
pub mod worker;

pub use crypto::ZERO_HASH;
