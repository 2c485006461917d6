use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::registry::{InMemoryKeyRegistry, InMemoryNonceStore, KeyRegistry, NonceStore};
use super::{canonical, AgentKeyRecord, CryptoError, CryptoResult};
use crate::clock;

/// Default replay window in seconds.
pub const DEFAULT_REPLAY_WINDOW_SECS: u64 = 300;

/// Default tolerance for signer clocks running ahead of the verifier.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 30;

/// Bounds on envelope age and nonce retention.
///
/// With `window_secs = None` envelopes never expire and the nonce set is
/// never evicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub window_secs: Option<u64>,
    pub clock_skew_secs: i64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            window_secs: Some(DEFAULT_REPLAY_WINDOW_SECS),
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
        }
    }
}

impl ReplayConfig {
    pub fn unbounded() -> Self {
        Self {
            window_secs: None,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
        }
    }

    fn window(&self) -> Option<Duration> {
        self.window_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
    }
}

/// A payload signed by a registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope<T> {
    pub payload: T,
    /// Hex-encoded 64-byte Ed25519 signature.
    pub signature: String,
    pub signer_did: String,
    /// RFC 3339 text exactly as signed.
    pub signed_at: String,
    pub nonce: String,
}

/// Exactly the fields covered by the signature.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningInput<'a, T> {
    payload: &'a T,
    signer_did: &'a str,
    signed_at: &'a str,
    nonce: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationError {
    UnknownDid,
    InvalidSignature,
    ReplayDetected,
    Expired,
}

impl VerificationError {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationError::UnknownDid => "UNKNOWN_DID",
            VerificationError::InvalidSignature => "INVALID_SIGNATURE",
            VerificationError::ReplayDetected => "REPLAY_DETECTED",
            VerificationError::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<VerificationError>,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    fn accepted(signer_did: &str, at: DateTime<Utc>) -> Self {
        Self {
            valid: true,
            signer_did: Some(signer_did.to_string()),
            error: None,
            verified_at: at,
        }
    }

    fn rejected(signer_did: Option<&str>, error: VerificationError, at: DateTime<Utc>) -> Self {
        Self {
            valid: false,
            signer_did: signer_did.map(str::to_string),
            error: Some(error),
            verified_at: at,
        }
    }
}

/// Signing and verification over injectable key and nonce stores.
pub struct CryptoService<K = InMemoryKeyRegistry, N = InMemoryNonceStore> {
    registry: K,
    nonces: N,
    replay: ReplayConfig,
}

impl CryptoService {
    /// Service backed by process-local stores.
    pub fn in_memory(replay: ReplayConfig) -> Self {
        Self::new(InMemoryKeyRegistry::new(), InMemoryNonceStore::new(), replay)
    }
}

impl<K: KeyRegistry, N: NonceStore> CryptoService<K, N> {
    pub fn new(registry: K, nonces: N, replay: ReplayConfig) -> Self {
        Self {
            registry,
            nonces,
            replay,
        }
    }

    pub fn registry(&self) -> &K {
        &self.registry
    }

    pub fn nonces(&self) -> &N {
        &self.nonces
    }

    /// Insert or overwrite a key record. A revoked DID stays revoked.
    pub fn register_agent(&self, mut record: AgentKeyRecord) -> CryptoResult<()> {
        if let Some(existing) = self.registry.get(&record.did)? {
            if let Some(revoked_at) = existing.revoked_at {
                record.revoked_at = Some(revoked_at);
            }
        }
        tracing::debug!(did = %record.did, persona = %record.persona, "agent registered");
        self.registry.put(record)
    }

    /// Revoke a key permanently. Returns `false` for an unknown DID.
    pub fn revoke_agent(&self, did: &str) -> CryptoResult<bool> {
        let revoked = self.registry.revoke(did, Utc::now())?;
        if revoked {
            tracing::info!(did = %did, "agent key revoked");
        }
        Ok(revoked)
    }

    /// Sign `payload` as `signer_did` with a PKCS#8 DER hex private key.
    pub fn sign<T: Serialize>(
        &self,
        payload: T,
        private_key_hex: &str,
        signer_did: &str,
    ) -> CryptoResult<SignedEnvelope<T>> {
        sign_at(payload, private_key_hex, signer_did, Utc::now())
    }

    /// Verify an envelope against the registry, consuming its nonce on success.
    pub fn verify<T: Serialize>(&self, envelope: &SignedEnvelope<T>) -> CryptoResult<VerificationResult> {
        self.verify_at(envelope, Utc::now())
    }

    /// [`verify`](Self::verify) with an explicit clock.
    pub fn verify_at<T: Serialize>(
        &self,
        envelope: &SignedEnvelope<T>,
        now: DateTime<Utc>,
    ) -> CryptoResult<VerificationResult> {
        let did = envelope.signer_did.as_str();
        let reject = |error: VerificationError| -> CryptoResult<VerificationResult> {
            tracing::debug!(signer_did = %did, error = %error, "envelope rejected");
            Ok(VerificationResult::rejected(Some(did), error, now))
        };

        // 1. Signer must be registered
        let Some(record) = self.registry.get(did)? else {
            tracing::debug!(signer_did = %did, "envelope from unknown signer");
            return Ok(VerificationResult::rejected(
                None,
                VerificationError::UnknownDid,
                now,
            ));
        };

        // 2. Revocation is permanent
        if record.is_revoked() {
            return reject(VerificationError::InvalidSignature);
        }

        // 3. Replay
        if self.nonces.contains(did, &envelope.nonce)? {
            return reject(VerificationError::ReplayDetected);
        }

        // 4. Freshness
        let Ok(signed_at) = DateTime::parse_from_rfc3339(&envelope.signed_at) else {
            return reject(VerificationError::InvalidSignature);
        };
        let signed_at = signed_at.with_timezone(&Utc);
        if let Some(window) = self.replay.window() {
            let skew = Duration::try_seconds(self.replay.clock_skew_secs.max(0))
                .unwrap_or_else(Duration::zero);
            if signed_at < now - window || signed_at > now + skew {
                return reject(VerificationError::Expired);
            }
        }

        // 5. Signature over the canonical message
        if !signature_matches(envelope, &record.public_key_hex)? {
            return reject(VerificationError::InvalidSignature);
        }

        // 6. Consume the nonce; losing a race to a concurrent verifier is a replay
        if !self.nonces.put(did, &envelope.nonce, signed_at)? {
            return reject(VerificationError::ReplayDetected);
        }

        if let Some(window) = self.replay.window() {
            let evicted = self.nonces.evict_before(now - window)?;
            if evicted > 0 {
                tracing::debug!(evicted, "expired nonces evicted");
            }
        }

        Ok(VerificationResult::accepted(did, now))
    }
}

/// Sign with an explicit timestamp.
pub(crate) fn sign_at<T: Serialize>(
    payload: T,
    private_key_hex: &str,
    signer_did: &str,
    at: DateTime<Utc>,
) -> CryptoResult<SignedEnvelope<T>> {
    let der = hex::decode(private_key_hex)
        .map_err(|e| CryptoError::InvalidPrivateKey(format!("not hex: {e}")))?;
    let signing_key = SigningKey::from_pkcs8_der(&der)
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;

    let nonce = uuid::Uuid::new_v4().to_string();
    let signed_at = clock::format_timestamp(at);
    let message = canonical::to_vec(&SigningInput {
        payload: &payload,
        signer_did,
        signed_at: &signed_at,
        nonce: &nonce,
    })?;
    let signature = signing_key.sign(&message);

    Ok(SignedEnvelope {
        payload,
        signature: hex::encode(signature.to_bytes()),
        signer_did: signer_did.to_string(),
        signed_at,
        nonce,
    })
}

fn signature_matches<T: Serialize>(
    envelope: &SignedEnvelope<T>,
    public_key_hex: &str,
) -> CryptoResult<bool> {
    let Ok(der) = hex::decode(public_key_hex) else {
        tracing::warn!(signer_did = %envelope.signer_did, "registered public key is not hex");
        return Ok(false);
    };
    let Ok(verifying_key) = VerifyingKey::from_public_key_der(&der) else {
        tracing::warn!(signer_did = %envelope.signer_did, "registered public key is not SPKI DER");
        return Ok(false);
    };
    let Ok(signature_bytes) = hex::decode(&envelope.signature) else {
        return Ok(false);
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return Ok(false);
    };

    let message = canonical::to_vec(&SigningInput {
        payload: &envelope.payload,
        signer_did: &envelope.signer_did,
        signed_at: &envelope.signed_at,
        nonce: &envelope.nonce,
    })?;
    Ok(verifying_key.verify(&message, &signature).is_ok())
}
