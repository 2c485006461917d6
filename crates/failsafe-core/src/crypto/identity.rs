use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use pkcs8::{EncodePrivateKey, EncodePublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{sha256_hex, CryptoError};

/// Length of the hash segment embedded in a DID.
const DID_HASH_LEN: usize = 32;

/// Agent role bound into every DID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Scrivener,
    Sentinel,
    Judge,
    Overseer,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Scrivener => "scrivener",
            Persona::Sentinel => "sentinel",
            Persona::Judge => "judge",
            Persona::Overseer => "overseer",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persona {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scrivener" => Ok(Persona::Scrivener),
            "sentinel" => Ok(Persona::Sentinel),
            "judge" => Ok(Persona::Judge),
            "overseer" => Ok(Persona::Overseer),
            other => Err(CryptoError::Encoding(format!("unknown persona: {other}"))),
        }
    }
}

/// Derive the DID for a persona/public-key pair.
///
/// Format: `did:myth:{persona}:{sha256("{persona}:{public_key_hex}")[..32]}`.
pub fn derive_did(persona: Persona, public_key_hex: &str) -> String {
    let digest = sha256_hex(format!("{persona}:{public_key_hex}"));
    format!("did:myth:{persona}:{}", &digest[..DID_HASH_LEN])
}

/// Hex-encoded DER key material.
///
/// `public_key_hex` is SubjectPublicKeyInfo, `private_key_hex` is PKCS#8.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public_key_hex: String,
    pub private_key_hex: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key_hex", &self.public_key_hex)
            .field("private_key_hex", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh Ed25519 key pair.
pub fn generate_key_pair() -> Result<KeyPair, CryptoError> {
    let signing_key = SigningKey::generate(&mut rand::thread_rng());
    let verifying_key = signing_key.verifying_key();

    let private_der = signing_key
        .to_pkcs8_der()
        .map_err(|e| CryptoError::Encoding(format!("pkcs8: {e}")))?;
    let public_der = verifying_key
        .to_public_key_der()
        .map_err(|e| CryptoError::Encoding(format!("spki: {e}")))?;

    Ok(KeyPair {
        public_key_hex: hex::encode(public_der.as_bytes()),
        private_key_hex: hex::encode(private_der.as_bytes()),
    })
}

/// Registered signing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentKeyRecord {
    pub did: String,
    pub public_key_hex: String,
    pub persona: Persona,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AgentKeyRecord {
    /// Build a record whose DID is derived from the persona and key.
    pub fn new(persona: Persona, public_key_hex: impl Into<String>) -> Self {
        let public_key_hex = public_key_hex.into();
        Self {
            did: derive_did(persona, &public_key_hex),
            public_key_hex,
            persona,
            registered_at: Utc::now(),
            revoked_at: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}
