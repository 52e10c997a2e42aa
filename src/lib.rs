//! A single-node, append-only ledger.
//!
//! Signed transfers are queued, sealed into proof-of-work blocks together with
//! a miner reward, and persisted as a full snapshot after every seal. Anyone
//! holding the snapshot can re-verify the chain offline.

pub mod api;
pub mod blockchain;
pub mod config;

pub use blockchain::{
    Address, Block, ChainSnapshot, ChainStore, KeyCustody, Ledger, LedgerConfig, LedgerError,
    Transaction, Wallet,
};
pub use config::{ConfigError, NodeSettings, StoreKind};
