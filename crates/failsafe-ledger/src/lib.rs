//! Durable storage for the failsafe governance layer.
//!
//! | Module | Database | Contents |
//! |--------|----------|----------|
//! | [`ledger`] | `ledger.db` | hash-chained, HMAC-signed SOA ledger |
//! | [`shadow`] | `shadow_genome.db` | forensic failure records |
//! | [`replay`] | `replay.db` | shared key registry and nonce set |
//!
//! Ledger and shadow genome schemas are versioned through
//! [`schema::SchemaVersionManager`]; every store migrates on open and refuses
//! a database whose schema is newer than this build or whose recorded
//! migration checksums have drifted.

pub mod archive;
pub mod db;
pub mod error;
pub mod ledger;
pub mod replay;
pub mod retention;
pub mod schema;
pub mod secret;
pub mod shadow;

pub use archive::{LedgerArchive, LedgerArchiver};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{LedgerEntry, LedgerQuery, LedgerVerification, SoaLedger};
pub use replay::{open_replay_stores, SqliteKeyRegistry, SqliteNonceStore};
pub use retention::{PruneResult, RetentionPolicy, RetentionStats};
pub use schema::{SchemaStatus, SchemaVersion, SchemaVersionManager};
pub use secret::LedgerSecret;
pub use shadow::{ArchiveFailureRequest, FailureMode, RemediationStatus, ShadowGenomeStore};
