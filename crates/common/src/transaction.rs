//! # Transaction Envelope
//!
//! Wire format for sponsored transactions exchanged between the client,
//! the backend sponsor and third-party sponsor APIs.
//!
//! ```text
//! TransactionKind (move call)      ── kind_bytes() ──▶ zkLogin sponsor path
//!        │
//!        ▼
//! TransactionData {sender, kind, gas}
//!        │ to_bytes()  (canonical JSON)
//!        ▼
//! base64 tx bytes ──▶ wallet signs intent(bytes) ──▶ UserSignature
//!        │
//!        ▼
//! sponsor countersigns + executes ──▶ digest
//! ```
//!
//! ## Signing Message
//!
//! Both user and sponsor sign `SHA3-256([0, 0, 0] || tx bytes)`. The
//! three-byte intent prefix keeps transaction signatures from being
//! replayed as personal-message signatures.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::crypto::{self, CryptoError, ED25519_FLAG};
use crate::move_call::{MoveCall, MoveCallError};
use crate::types::Address;

/// Intent prefix for transaction data.
pub const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

/// Encoded length of an Ed25519 user signature (flag + sig + pubkey).
pub const USER_SIGNATURE_LEN: usize = 1 + 64 + 32;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("transaction decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid signature encoding: {0}")]
    SignatureEncoding(String),

    #[error("signature does not verify for the transaction bytes")]
    BadSignature,

    #[error("signature signer {signer} does not match expected {expected}")]
    SignerMismatch { signer: Address, expected: Address },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    MoveCall(#[from] MoveCallError),
}

// ════════════════════════════════════════════════════════════════════════════════
// TRANSACTION DATA
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "call", rename_all = "snake_case")]
pub enum TransactionKind {
    MoveCall(MoveCall),
}

impl TransactionKind {
    pub fn move_call(&self) -> &MoveCall {
        match self {
            TransactionKind::MoveCall(call) => call,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Gas payment. `owner` differs from the sender on sponsored transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasData {
    pub owner: Address,
    pub budget: u64,
    pub price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub sender: Address,
    pub kind: TransactionKind,
    pub gas: GasData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_epoch: Option<u64>,
}

impl TransactionData {
    pub fn is_sponsored(&self) -> bool {
        self.gas.owner != self.sender
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_base64(&self) -> Result<String, TransactionError> {
        Ok(STANDARD.encode(self.to_bytes()?))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, TransactionError> {
        Self::from_bytes(&STANDARD.decode(encoded)?)
    }
}

/// Message actually signed for a transaction: hash of intent + bytes.
pub fn signing_message(tx_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(TRANSACTION_INTENT);
    hasher.update(tx_bytes);
    hasher.finalize().into()
}

/// Transaction digest as `0x`-prefixed hex.
pub fn digest(tx_bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(signing_message(tx_bytes)))
}

// ════════════════════════════════════════════════════════════════════════════════
// SIGNATURES
// ════════════════════════════════════════════════════════════════════════════════

/// Serialized user signature: `flag || signature || public key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSignature {
    pub signature: [u8; 64],
    pub public_key: [u8; 32],
}

impl UserSignature {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(USER_SIGNATURE_LEN);
        out.push(ED25519_FLAG);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.public_key);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        if bytes.len() != USER_SIGNATURE_LEN {
            return Err(TransactionError::SignatureEncoding(format!(
                "expected {} bytes, got {}",
                USER_SIGNATURE_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != ED25519_FLAG {
            return Err(TransactionError::SignatureEncoding(format!(
                "unsupported scheme flag {:#04x}",
                bytes[0]
            )));
        }
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&bytes[1..65]);
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&bytes[65..97]);
        Ok(Self { signature, public_key })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, TransactionError> {
        Self::from_bytes(&STANDARD.decode(encoded)?)
    }

    /// Address of the key that produced this signature.
    pub fn signer(&self) -> Result<Address, TransactionError> {
        let vk = crypto::verifying_key_from_bytes(&self.public_key)?;
        Ok(crypto::address_from_public_key(&vk))
    }

    /// Verify against transaction bytes and return the signer address.
    pub fn verify(&self, tx_bytes: &[u8]) -> Result<Address, TransactionError> {
        let vk = crypto::verifying_key_from_bytes(&self.public_key)?;
        let message = signing_message(tx_bytes);
        if !crypto::verify_signature(&vk, &message, &self.signature)? {
            return Err(TransactionError::BadSignature);
        }
        Ok(crypto::address_from_public_key(&vk))
    }
}

/// Sign transaction bytes with an Ed25519 key.
pub fn sign_transaction(key: &SigningKey, tx_bytes: &[u8]) -> UserSignature {
    let message = signing_message(tx_bytes);
    UserSignature {
        signature: crypto::sign_message(key, &message),
        public_key: key.verifying_key().to_bytes(),
    }
}

/// Verify that `signature` was produced by `expected` over `tx_bytes`.
pub fn verify_user_signature(
    tx_bytes: &[u8],
    signature: &UserSignature,
    expected: &Address,
) -> Result<(), TransactionError> {
    let signer = signature.verify(tx_bytes)?;
    if &signer != expected {
        return Err(TransactionError::SignerMismatch {
            signer,
            expected: expected.clone(),
        });
    }
    Ok(())
}

/// A sponsored transaction ready for the user's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsoredTransaction {
    /// Base64 transaction bytes.
    pub bytes: String,
    pub digest: String,
    /// Sponsor's signature when the sponsor signs up front (zkLogin path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor_signature: Option<String>,
}

/// Result of executing a transaction on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub digest: String,
    #[serde(default)]
    pub created: Vec<crate::types::ObjectId>,
}
