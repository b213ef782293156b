//! Crypto helpers: Ed25519 keypair generation, sign, verify, and hex utilities.
//!
//! Combined key format (64 bytes):
//!   [0..32]  = private key bytes
//!   [32..64] = public key bytes
//!
//! Account addresses are `SHA3-256(flag || public key)` with flag `0x00`
//! for Ed25519.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hex::{decode as hex_decode, encode as hex_encode};
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::types::Address;

/// Signature scheme flag for Ed25519.
pub const ED25519_FLAG: u8 = 0x00;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, found {found}")]
    InvalidKeyLength { expected: usize, found: usize },

    #[error("verification failed")]
    VerifyFailed,

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Generate a new Ed25519 keypair and return concatenated 64-byte (private + public).
pub fn generate_keypair_bytes() -> Vec<u8> {
    let mut rng = OsRng;
    let sk = SigningKey::generate(&mut rng);
    let vk = sk.verifying_key();

    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(&sk.to_bytes());
    combined.extend_from_slice(&vk.to_bytes());
    combined
}

/// Build a SigningKey from combined keypair bytes or a bare 32-byte secret.
pub fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey, CryptoError> {
    if bytes.len() != 64 && bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyLength { expected: 64, found: bytes.len() });
    }
    let mut sk_bytes = [0u8; 32];
    sk_bytes.copy_from_slice(&bytes[0..32]);
    Ok(SigningKey::from_bytes(&sk_bytes))
}

pub fn signing_key_from_hex(hexstr: &str) -> Result<SigningKey, CryptoError> {
    let bytes = hex_decode(hexstr.trim().trim_start_matches("0x"))?;
    signing_key_from_bytes(&bytes)
}

pub fn signing_key_to_hex(key: &SigningKey) -> String {
    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(&key.to_bytes());
    combined.extend_from_slice(&key.verifying_key().to_bytes());
    hex_encode(combined)
}

pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, CryptoError> {
    if bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyLength { expected: 32, found: bytes.len() });
    }
    let mut pk_arr = [0u8; 32];
    pk_arr.copy_from_slice(bytes);
    VerifyingKey::from_bytes(&pk_arr).map_err(|_| CryptoError::VerifyFailed)
}

/// Derive the account address owned by an Ed25519 public key.
pub fn address_from_public_key(pk: &VerifyingKey) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update([ED25519_FLAG]);
    hasher.update(pk.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    Address::from_bytes(digest)
}

/// Sign a message and return the 64-byte signature.
pub fn sign_message(key: &SigningKey, message: &[u8]) -> [u8; 64] {
    key.sign(message).to_bytes()
}

/// Verify a message given public key and signature.
pub fn verify_signature(pk: &VerifyingKey, message: &[u8], sig_bytes: &[u8]) -> Result<bool, CryptoError> {
    if sig_bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength { expected: 64, found: sig_bytes.len() });
    }
    let mut sig_arr = [0u8; 64];
    sig_arr.copy_from_slice(sig_bytes);
    let sig = Signature::from_bytes(&sig_arr);

    Ok(pk.verify(message, &sig).is_ok())
}
