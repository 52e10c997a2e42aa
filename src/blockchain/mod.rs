// Blockchain module
//
// This module contains the ledger core:
// - Key custody and signatures
// - Signable transactions
// - Proof-of-work sealed blocks
// - The ledger state machine
// - The persistence port and its backends

pub mod block;
pub mod crypto;
pub mod ledger;
pub mod storage;
pub mod transaction;

// Re-export main components for easier access
pub use block::Block;
pub use crypto::{Address, DigitalSignature, KeyCustody, Wallet};
pub use ledger::{Ledger, LedgerConfig, LedgerError};
pub use storage::{ChainSnapshot, ChainStore, JsonFileStore, MemoryStore, SledStore, StorageError};
pub use transaction::{Transaction, TransactionError};
