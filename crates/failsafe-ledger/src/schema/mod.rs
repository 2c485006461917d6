//! Versioned schema evolution.
//!
//! Each database keeps a table of applied migrations (`schema_migrations` for
//! the ledger, `schema_version` for the shadow genome) holding the version,
//! description, application time and a checksum of the migration definition.
//! A stored checksum that no longer matches the registry means the code
//! changed after deployment; it is reported and blocks startup.

mod manager;
mod migration;
mod registry;
mod version;

pub use manager::{
    AppliedMigration, ChecksumMismatch, IntegrityReport, MigrationReport, SchemaStatus,
    SchemaVersionManager,
};
pub use migration::{Migration, MigrationStep};
pub use version::SchemaVersion;
