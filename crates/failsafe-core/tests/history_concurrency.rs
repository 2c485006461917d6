use failsafe_core::intent::{HistoryEvent, IntentHistoryLog, NewHistoryEntry, GENESIS_HASH};
use failsafe_core::LockConfig;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn patient_lock() -> LockConfig {
    LockConfig {
        retries: 200,
        min_timeout_ms: 1,
        max_timeout_ms: 20,
        factor: 2,
    }
}

#[test]
fn concurrent_appenders_produce_one_unforked_chain() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("intent_history.jsonl");

    let writers = 6;
    let per_writer = 15;
    let handles: Vec<_> = (0..writers)
        .map(|w| {
            // Separate log handles model separate processes sharing one file.
            let log = Arc::new(IntentHistoryLog::at(path.clone(), patient_lock()));
            thread::spawn(move || {
                for i in 0..per_writer {
                    log.append_entry(NewHistoryEntry::new(
                        format!("intent-{w}"),
                        HistoryEvent::EvidenceUpdated,
                        format!("writer-{w}-{i}"),
                    ))
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let log = IntentHistoryLog::at(path, LockConfig::default());
    let entries = log.load_all_entries().unwrap();
    assert_eq!(entries.len(), writers * per_writer);
    assert_eq!(entries[0].previous_hash, GENESIS_HASH);
    for pair in entries.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].entry_hash);
    }

    let verification = log.verify_chain_integrity().unwrap();
    assert!(verification.valid, "{:?}", verification.error);
    assert_eq!(verification.entries_checked, writers * per_writer);
}
