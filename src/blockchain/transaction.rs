use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, Wallet};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Unauthorized signer: key address {signer} cannot sign for sender {sender}")]
    UnauthorizedSigner { signer: String, sender: String },

    #[error("Missing signature: transaction from {0} was never signed")]
    MissingSignature(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// A value transfer between two addresses.
///
/// A transaction without a sender is a reward (or genesis) entry and is exempt
/// from signature checks. Every other transaction must carry a signature made
/// by the sender's key over [`Transaction::compute_hash`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Sender's address, absent for reward entries
    pub from_address: Option<Address>,

    /// Recipient's address
    pub to_address: Option<Address>,

    /// Amount being transferred
    pub amount: f64,

    /// Creation instant
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Sender's signature over the content hash
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transfer stamped with the current time
    pub fn new(from_address: Address, to_address: Address, amount: f64) -> Self {
        Self::from_parts(Some(from_address), Some(to_address), amount, Utc::now())
    }

    /// Creates a reward transaction crediting `to_address`
    pub fn reward(to_address: Address, amount: f64) -> Self {
        Self::from_parts(None, Some(to_address), amount, Utc::now())
    }

    /// Creates an unsigned transaction from its raw content fields
    pub fn from_parts(
        from_address: Option<Address>,
        to_address: Option<Address>,
        amount: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Transaction {
            from_address,
            to_address,
            amount,
            timestamp,
            signature: None,
        }
    }

    /// Content hash over sender, recipient, amount and timestamp.
    ///
    /// This is both the signing payload and the double-spend key. The
    /// signature is not part of it.
    pub fn compute_hash(&self) -> String {
        let payload = serde_json::json!({
            "fromAddress": self.from_address,
            "toAddress": self.to_address,
            "amount": self.amount,
            "timestamp": self.timestamp,
        });

        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Signs the transaction with the sender's wallet
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.from_address.as_ref() != Some(wallet.address()) {
            return Err(TransactionError::UnauthorizedSigner {
                signer: wallet.address().to_string(),
                sender: self.sender_label(),
            });
        }

        let hash = self.compute_hash();
        self.signature = Some(wallet.sign(hash.as_bytes()));

        Ok(())
    }

    /// Checks the signature against the sender's public key.
    ///
    /// Reward entries always verify. A signed-for transaction with no
    /// signature attached is an error rather than `false`.
    pub fn verify(&self) -> Result<bool, TransactionError> {
        let sender = match &self.from_address {
            Some(sender) => sender,
            None => return Ok(true),
        };

        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| TransactionError::MissingSignature(sender.to_string()))?;

        let public_key = sender.to_public_key()?;
        let hash = self.compute_hash();

        Ok(verify_signature(hash.as_bytes(), signature, &public_key)?)
    }

    /// True for sender-less reward or genesis entries
    pub fn is_reward(&self) -> bool {
        self.from_address.is_none()
    }

    fn sender_label(&self) -> String {
        self.from_address
            .as_ref()
            .map(Address::to_string)
            .unwrap_or_else(|| "<none>".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::KeyCustody;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_transaction() {
        let custody = KeyCustody::new();
        let sender = custody.generate_wallet();
        let recipient = custody.generate_wallet();

        let transaction = Transaction::new(sender.address().clone(), recipient.address().clone(), 10.5);

        assert_eq!(transaction.from_address.as_ref(), Some(sender.address()));
        assert_eq!(transaction.to_address.as_ref(), Some(recipient.address()));
        assert_eq!(transaction.amount, 10.5);
        assert!(transaction.signature.is_none());
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_hash_is_deterministic_and_field_sensitive() {
        let from = Some(Address("alice".to_string()));
        let to = Some(Address("bob".to_string()));
        let base = Transaction::from_parts(from.clone(), to.clone(), 50.0, fixed_time());

        assert_eq!(base.compute_hash(), base.clone().compute_hash());
        assert_eq!(base.compute_hash().len(), 64);

        let variants = [
            Transaction::from_parts(Some(Address("carol".to_string())), to.clone(), 50.0, fixed_time()),
            Transaction::from_parts(None, to.clone(), 50.0, fixed_time()),
            Transaction::from_parts(from.clone(), Some(Address("dave".to_string())), 50.0, fixed_time()),
            Transaction::from_parts(from.clone(), to.clone(), 50.5, fixed_time()),
            Transaction::from_parts(from, to, 50.0, fixed_time() + chrono::Duration::milliseconds(1)),
        ];
        for variant in &variants {
            assert_ne!(variant.compute_hash(), base.compute_hash());
        }
    }

    #[test]
    fn test_signature_does_not_change_hash() {
        let wallet = KeyCustody::new().generate_wallet();
        let mut transaction = Transaction::new(wallet.address().clone(), Address("bob".to_string()), 1.0);
        let before = transaction.compute_hash();

        transaction.sign(&wallet).unwrap();

        assert_eq!(transaction.compute_hash(), before);
    }

    #[test]
    fn test_sign_and_verify() {
        let custody = KeyCustody::new();
        let sender = custody.generate_wallet();
        let recipient = custody.generate_wallet();

        let mut transaction = Transaction::new(sender.address().clone(), recipient.address().clone(), 10.5);
        transaction.sign(&sender).unwrap();

        assert!(transaction.signature.is_some());
        assert!(transaction.verify().unwrap());
    }

    #[test]
    fn test_sign_with_foreign_key_is_unauthorized() {
        let custody = KeyCustody::new();
        let sender = custody.generate_wallet();
        let intruder = custody.generate_wallet();

        let mut transaction = Transaction::new(sender.address().clone(), intruder.address().clone(), 5.0);
        let err = transaction.sign(&intruder).unwrap_err();

        assert!(matches!(err, TransactionError::UnauthorizedSigner { .. }));
        assert!(transaction.signature.is_none());
    }

    #[test]
    fn test_unsigned_transfer_is_missing_signature() {
        let sender = KeyCustody::new().generate_wallet();
        let transaction = Transaction::new(sender.address().clone(), Address("bob".to_string()), 5.0);

        assert!(matches!(transaction.verify(), Err(TransactionError::MissingSignature(_))));
    }

    #[test]
    fn test_tampered_amount_fails_verification() {
        let sender = KeyCustody::new().generate_wallet();
        let mut transaction = Transaction::new(sender.address().clone(), Address("bob".to_string()), 5.0);
        transaction.sign(&sender).unwrap();

        transaction.amount = 500.0;

        assert!(!transaction.verify().unwrap());
    }

    #[test]
    fn test_reward_transaction_is_exempt() {
        let miner = KeyCustody::new().generate_wallet();
        let transaction = Transaction::reward(miner.address().clone(), 100.0);

        assert!(transaction.is_reward());
        assert!(transaction.signature.is_none());
        assert_eq!(transaction.to_address.as_ref(), Some(miner.address()));
        assert!(transaction.verify().unwrap());
    }
}
