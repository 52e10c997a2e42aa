use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Previous-hash sentinel carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Represents a block in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Index of the block in the chain, 0 for genesis
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions sealed into this block, in insertion order
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof-of-work search counter
    pub nonce: u64,

    /// Hash of this block
    pub hash: String,
}

impl Block {
    /// Creates an unmined block stamped with the current time
    pub fn new(index: u64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        Self::with_timestamp(index, Utc::now(), transactions, previous_hash)
    }

    /// Creates an unmined block with `nonce = 0` and its hash filled in
    pub fn with_timestamp(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// The fixed first block: no transactions and the sentinel previous hash
    pub fn genesis() -> Self {
        Self::new(0, Vec::new(), GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Calculates the SHA-256 hash of the block contents as lowercase hex
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();

        // Transactions serialize with a fixed field order, so this is stable.
        let block_data = serde_json::json!({
            "index": self.index,
            "previousHash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "nonce": self.nonce,
        });

        hasher.update(block_data.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// True if the stored hash starts with `difficulty` zero hex digits
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.hash.len() >= difficulty && self.hash.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// Searches for the smallest nonce whose hash meets `difficulty`.
    ///
    /// Blocks the caller until a nonce is found. There is no upper bound on
    /// attempts.
    pub fn mine(&mut self, difficulty: usize) {
        while !self.meets_difficulty(difficulty) {
            self.nonce += 1;
            self.hash = self.compute_hash();
        }

        debug!(
            "Block {} mined with nonce {}: {}",
            self.index, self.nonce, self.hash
        );
    }
}
