use failsafe_core::crypto::{
    generate_key_pair, AgentKeyRecord, CryptoService, Persona, ReplayConfig, VerificationError,
};
use failsafe_ledger::open_replay_stores;
use serde_json::json;

#[test]
fn replay_is_detected_across_services_sharing_a_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replay.db");

    let (registry, nonces) = open_replay_stores(&path).unwrap();
    let first = CryptoService::new(registry, nonces, ReplayConfig::default());
    let (registry, nonces) = open_replay_stores(&path).unwrap();
    let second = CryptoService::new(registry, nonces, ReplayConfig::default());

    let keys = generate_key_pair().unwrap();
    let record = AgentKeyRecord::new(Persona::Scrivener, keys.public_key_hex.clone());
    let did = record.did.clone();
    first.register_agent(record).unwrap();

    let envelope = first
        .sign(json!({"x": 1}), &keys.private_key_hex, &did)
        .unwrap();

    // The second service sees the key registered through the first
    let accepted = second.verify(&envelope).unwrap();
    assert!(accepted.valid);
    assert_eq!(accepted.signer_did.as_deref(), Some(did.as_str()));

    let replayed = first.verify(&envelope).unwrap();
    assert!(!replayed.valid);
    assert_eq!(replayed.error, Some(VerificationError::ReplayDetected));
}

#[test]
fn revocation_is_shared() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replay.db");

    let (registry, nonces) = open_replay_stores(&path).unwrap();
    let issuer = CryptoService::new(registry, nonces, ReplayConfig::default());
    let (registry, nonces) = open_replay_stores(&path).unwrap();
    let verifier = CryptoService::new(registry, nonces, ReplayConfig::default());

    let keys = generate_key_pair().unwrap();
    let record = AgentKeyRecord::new(Persona::Judge, keys.public_key_hex.clone());
    let did = record.did.clone();
    issuer.register_agent(record).unwrap();
    let envelope = issuer
        .sign(json!({"x": 1}), &keys.private_key_hex, &did)
        .unwrap();

    assert!(issuer.revoke_agent(&did).unwrap());
    let result = verifier.verify(&envelope).unwrap();
    assert_eq!(result.error, Some(VerificationError::InvalidSignature));
}
