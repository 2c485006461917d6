use failsafe_core::governance::{LedgerAppendRequest, LedgerEventType};
use failsafe_ledger::{LedgerQuery, LedgerSecret, SoaLedger};
use serde_json::json;
use std::thread;

#[test]
fn concurrent_handles_extend_one_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let secret = LedgerSecret::new("shared-secret").unwrap();
    SoaLedger::open(&path, secret.clone()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let path = path.clone();
            let secret = secret.clone();
            thread::spawn(move || {
                let ledger = SoaLedger::open(&path, secret).unwrap();
                for n in 0..10 {
                    ledger
                        .append(&LedgerAppendRequest::new(
                            LedgerEventType::Proposal,
                            format!("did:myth:scrivener:{worker:02x}"),
                            json!({ "n": n }),
                        ))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ledger = SoaLedger::open(&path, secret).unwrap();
    assert_eq!(ledger.entry_count().unwrap(), 41);
    let verification = ledger.verify_chain().unwrap();
    assert!(verification.valid, "{:?}", verification.reason);
    assert_eq!(verification.entries_checked, 41);
}

#[test]
fn query_filters_and_caps() {
    let ledger = SoaLedger::memory(LedgerSecret::new("q").unwrap()).unwrap();
    for n in 0..3 {
        ledger
            .append(
                &LedgerAppendRequest::new(LedgerEventType::AuditFail, "did:a", json!({ "n": n }))
                    .with_artifact("src/lib.rs", None),
            )
            .unwrap();
    }
    ledger
        .append(&LedgerAppendRequest::new(
            LedgerEventType::AuditPass,
            "did:b",
            json!({}),
        ))
        .unwrap();

    let query = LedgerQuery {
        agent_did: Some("did:a".into()),
        artifact_path: Some("src/lib.rs".into()),
        limit: Some(2),
        ..LedgerQuery::default()
    };
    let rows = ledger.query(&query).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].payload["n"], 2);
    assert!(rows.iter().all(|r| r.event_type == LedgerEventType::AuditFail));
}
