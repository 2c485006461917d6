//! Canonical JSON (RFC 8785) for signed messages.
//!
//! The byte layout produced here is part of the signature contract: a verifier
//! in another process rebuilds exactly these bytes from the envelope fields.
//! `serde_jcs` sorts object keys at every depth and strips whitespace.

use serde::Serialize;

use super::CryptoError;

/// Serialize a value to canonical JSON bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, CryptoError> {
    serde_jcs::to_vec(value).map_err(|e| CryptoError::Canonicalization(e.to_string()))
}

/// Serialize a value to a canonical JSON string.
pub fn to_string<T: Serialize>(value: &T) -> Result<String, CryptoError> {
    serde_jcs::to_string(value).map_err(|e| CryptoError::Canonicalization(e.to_string()))
}
