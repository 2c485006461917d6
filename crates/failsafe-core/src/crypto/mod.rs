//! Agent identity, Ed25519 envelopes and replay protection.
//!
//! ```text
//! ┌──────────────┐  sign()   ┌────────────────┐  verify()  ┌───────────────┐
//! │ private key  │ ────────► │ SignedEnvelope │ ─────────► │ KeyRegistry   │
//! │ (PKCS#8 hex) │           │ payload+nonce  │            │ NonceStore    │
//! └──────────────┘           └────────────────┘            └───────────────┘
//! ```
//!
//! Verification checks run in a fixed order: unknown signer, revoked key,
//! replayed nonce, stale envelope, then the signature itself. Only a fully
//! successful verification consumes the nonce.

pub mod canonical;
mod identity;
mod registry;
mod service;

pub use identity::{derive_did, generate_key_pair, AgentKeyRecord, KeyPair, Persona};
pub use registry::{InMemoryKeyRegistry, InMemoryNonceStore, KeyRegistry, NonceStore};
pub use service::{
    CryptoService, ReplayConfig, SignedEnvelope, VerificationError, VerificationResult,
};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised by key handling and the backing stores.
///
/// Identity and replay failures are not errors: they are reported through
/// [`VerificationResult`].
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("key encoding failed: {0}")]
    Encoding(String),

    #[error("store error: {0}")]
    Store(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}
