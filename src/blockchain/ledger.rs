use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{error, info, warn};
use thiserror::Error;

use super::block::{Block, GENESIS_PREVIOUS_HASH};
use super::crypto::Address;
use super::storage::{ChainSnapshot, ChainStore, MemoryStore, StorageError};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Double spend detected: transaction {0} is already sealed")]
    DoubleSpend(String),

    #[error("Miner address is required")]
    MissingMinerAddress,

    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

/// Tunables fixed for the lifetime of a ledger
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerConfig {
    /// Leading zero hex digits required of a mined block hash
    pub difficulty: usize,

    /// Amount credited to the miner of each sealed block
    pub mining_reward: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 2,
            mining_reward: 100.0,
        }
    }
}

#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
    spent_tx_hashes: HashSet<String>,
}

/// The chain state machine.
///
/// All mutation goes through a single write lock, so `add_transaction` and
/// `seal_pending_transactions` never interleave. Mining runs while the write
/// lock is held.
pub struct Ledger {
    state: RwLock<LedgerState>,
    config: LedgerConfig,
    store: Arc<dyn ChainStore>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .field("height", &self.read_state().chain.len())
            .finish()
    }
}

impl Ledger {
    /// Opens a ledger backed by `store`.
    ///
    /// Loads the stored snapshot once. With nothing stored, a genesis block is
    /// created and saved immediately.
    pub fn open(store: Arc<dyn ChainStore>, config: LedgerConfig) -> Result<Self, LedgerError> {
        let chain = match store.load()? {
            Some(snapshot) if !snapshot.chain.is_empty() => {
                info!("Loaded chain of {} blocks from storage", snapshot.chain.len());
                if !validate_chain(&snapshot.chain) {
                    warn!("Stored chain fails validation; serving it as loaded");
                }
                snapshot.chain
            }
            _ => {
                info!("No existing chain found in storage, creating genesis block");
                let chain = vec![Block::genesis()];
                store.save(&ChainSnapshot {
                    chain: chain.clone(),
                })?;
                chain
            }
        };

        let spent_tx_hashes = chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .map(Transaction::compute_hash)
            .collect();

        Ok(Ledger {
            state: RwLock::new(LedgerState {
                chain,
                pending_transactions: Vec::new(),
                spent_tx_hashes,
            }),
            config,
            store,
        })
    }

    /// A ledger persisted only in process memory
    pub fn in_memory(config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::open(Arc::new(MemoryStore::new()), config)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    pub fn mining_reward(&self) -> f64 {
        self.config.mining_reward
    }

    /// Gets the entire chain
    pub fn chain(&self) -> Vec<Block> {
        self.read_state().chain.clone()
    }

    /// Gets the most recently appended block
    pub fn latest_block(&self) -> Option<Block> {
        self.read_state().chain.last().cloned()
    }

    /// Gets all transactions waiting to be sealed
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.read_state().pending_transactions.clone()
    }

    /// Verifies and queues a transaction.
    ///
    /// Only hashes that were already sealed count as double spends. An
    /// identical transaction still sitting in the pool is accepted again.
    ///
    /// Returns the index of the block the transaction is queued for.
    pub fn add_transaction(&self, transaction: Transaction) -> Result<u64, LedgerError> {
        let has_address = |address: &Option<Address>| {
            address.as_ref().map_or(false, |a| !a.is_blank())
        };
        if !has_address(&transaction.from_address) || !has_address(&transaction.to_address) {
            return Err(LedgerError::InvalidAddress(
                "Transaction must include from and to address".to_string(),
            ));
        }

        if !transaction.amount.is_finite() || transaction.amount < 0.0 {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must be a non-negative number, got {}",
                transaction.amount
            )));
        }

        match transaction.verify() {
            Ok(true) => {}
            Ok(false) => {
                warn!("Rejected transaction with a signature that does not match its sender");
                return Err(LedgerError::InvalidSignature(
                    "signature does not match sender".to_string(),
                ));
            }
            Err(err) => {
                warn!("Rejected transaction: {}", err);
                return Err(LedgerError::InvalidSignature(err.to_string()));
            }
        }

        let tx_hash = transaction.compute_hash();
        let mut state = self.write_state();

        if state.spent_tx_hashes.contains(&tx_hash) {
            warn!("Rejected double spend of transaction {}", tx_hash);
            return Err(LedgerError::DoubleSpend(tx_hash));
        }

        state.pending_transactions.push(transaction);
        Ok(state.chain.len() as u64)
    }

    /// Seals every pending transaction plus a reward for `miner_address` into
    /// a newly mined block, then persists the chain.
    ///
    /// A save failure is returned after the block is already appended in
    /// memory. Until the next successful save the stored snapshot lags behind.
    pub fn seal_pending_transactions(&self, miner_address: &Address) -> Result<Block, LedgerError> {
        if miner_address.is_blank() {
            return Err(LedgerError::MissingMinerAddress);
        }

        let mut state = self.write_state();

        let reward = Transaction::reward(miner_address.clone(), self.config.mining_reward);
        state.pending_transactions.push(reward);
        let transactions = std::mem::take(&mut state.pending_transactions);

        let previous_hash = state
            .chain
            .last()
            .map(|block| block.hash.clone())
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());

        let mut block = Block::new(state.chain.len() as u64, transactions, previous_hash);
        block.mine(self.config.difficulty);

        for transaction in &block.transactions {
            state.spent_tx_hashes.insert(transaction.compute_hash());
        }
        state.chain.push(block.clone());

        info!(
            "Sealed block {} with {} transactions: {}",
            block.index,
            block.transactions.len(),
            block.hash
        );

        let snapshot = ChainSnapshot {
            chain: state.chain.clone(),
        };
        if let Err(err) = self.store.save(&snapshot) {
            error!(
                "Failed to persist block {}; in-memory chain is ahead of storage: {}",
                block.index, err
            );
            return Err(err.into());
        }

        Ok(block)
    }

    /// Sums every credit minus every debit of `address` across the chain
    pub fn get_balance(&self, address: &Address) -> f64 {
        let state = self.read_state();
        let mut balance = 0.0;

        for block in &state.chain {
            for transaction in &block.transactions {
                if transaction.from_address.as_ref() == Some(address) {
                    balance -= transaction.amount;
                }
                if transaction.to_address.as_ref() == Some(address) {
                    balance += transaction.amount;
                }
            }
        }

        balance
    }

    /// Validates signatures, block hashes and hash linkage from block 1 on
    pub fn is_chain_valid(&self) -> bool {
        validate_chain(&self.read_state().chain)
    }
}

/// Checks every block after genesis.
///
/// Does not check the difficulty predicate or the genesis block itself.
fn validate_chain(chain: &[Block]) -> bool {
    for pair in chain.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);

        if !current
            .transactions
            .iter()
            .all(|tx| matches!(tx.verify(), Ok(true)))
        {
            warn!("Block {} holds a transaction that fails verification", current.index);
            return false;
        }

        if current.hash != current.compute_hash() {
            warn!("Block {} hash does not match its contents", current.index);
            return false;
        }

        if current.previous_hash != previous.hash {
            warn!("Block {} is not linked to block {}", current.index, previous.index);
            return false;
        }
    }

    true
}
