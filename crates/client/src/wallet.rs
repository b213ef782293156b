//! Wallet abstraction.
//!
//! A wallet owns the user's key and is the only component that can produce
//! a user signature. Two capabilities matter to the signer selection:
//!
//! - `raw_signing`: sign arbitrary transaction bytes built elsewhere
//!   (browser-extension style wallets, local keypairs).
//! - `sign_and_execute`: sign and submit a transaction in one step, the only
//!   thing zkLogin wallets can do with a sponsored transaction.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use thiserror::Error;
use tracing::debug;

use commity_common::crypto::{self, CryptoError};
use commity_common::error::{is_transient, is_user_rejection};
use commity_common::transaction::{sign_transaction, TransactionData};
use commity_common::{Address, ExecutionResult, SponsoredTransaction, UserSignature};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("user rejected the request")]
    Rejected,

    #[error("wallet does not support {0}")]
    Unsupported(&'static str),

    #[error("wallet network error: {0}")]
    Network(String),

    #[error("wallet error: {0}")]
    Other(String),
}

impl WalletError {
    /// Map a wallet's free-form error text onto the taxonomy.
    pub fn from_message(message: &str) -> Self {
        if is_user_rejection(message) {
            WalletError::Rejected
        } else if is_transient(message) {
            WalletError::Network(message.to_string())
        } else {
            WalletError::Other(message.to_string())
        }
    }

    /// Only network failures are worth another wallet prompt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::Network(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletCapabilities {
    pub raw_signing: bool,
    pub sign_and_execute: bool,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    fn address(&self) -> Address;

    fn capabilities(&self) -> WalletCapabilities;

    /// Sign serialized transaction bytes.
    async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<UserSignature, WalletError>;

    /// Sign a sponsored transaction and submit it.
    async fn sign_and_execute(&self, tx: &SponsoredTransaction) -> Result<ExecutionResult, WalletError>;
}

/// Callback deciding whether the holder approves a transaction.
pub type Approver = Arc<dyn Fn(&TransactionData) -> bool + Send + Sync>;

/// Wallet backed by a local Ed25519 key.
///
/// Supports raw signing only. An optional [`Approver`] stands in for the
/// confirmation prompt; without one every transaction is approved.
pub struct KeypairWallet {
    key: SigningKey,
    address: Address,
    approver: Option<Approver>,
}

impl fmt::Debug for KeypairWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeypairWallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl KeypairWallet {
    pub fn new(key: SigningKey) -> Self {
        let address = crypto::address_from_public_key(&key.verifying_key());
        Self {
            key,
            address,
            approver: None,
        }
    }

    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(crypto::signing_key_from_hex(hex_key)?))
    }

    pub fn generate() -> Result<Self, CryptoError> {
        let bytes = crypto::generate_keypair_bytes();
        Ok(Self::new(crypto::signing_key_from_bytes(&bytes)?))
    }

    pub fn with_approver(mut self, approver: Approver) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn secret_hex(&self) -> String {
        crypto::signing_key_to_hex(&self.key)
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    fn address(&self) -> Address {
        self.address.clone()
    }

    fn capabilities(&self) -> WalletCapabilities {
        WalletCapabilities {
            raw_signing: true,
            sign_and_execute: false,
        }
    }

    async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<UserSignature, WalletError> {
        let data = TransactionData::from_bytes(tx_bytes).map_err(|e| WalletError::Other(e.to_string()))?;
        if data.sender != self.address {
            return Err(WalletError::Other(format!(
                "transaction sender {} is not this wallet ({})",
                data.sender, self.address
            )));
        }
        if let Some(approve) = &self.approver {
            if !approve(&data) {
                debug!(target = %data.kind.move_call().target(), "signature declined");
                return Err(WalletError::Rejected);
            }
        }
        Ok(sign_transaction(&self.key, tx_bytes))
    }

    async fn sign_and_execute(&self, _tx: &SponsoredTransaction) -> Result<ExecutionResult, WalletError> {
        Err(WalletError::Unsupported("sign_and_execute"))
    }
}
