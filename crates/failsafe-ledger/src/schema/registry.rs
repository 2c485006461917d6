//! Migration registries for the two databases.

use super::{Migration, MigrationStep, SchemaVersion};

const SOA_LEDGER_V1: &str = "
CREATE TABLE IF NOT EXISTS soa_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL,
    agent_did TEXT NOT NULL,
    agent_trust_at_action REAL,
    model_version TEXT,
    artifact_path TEXT,
    artifact_hash TEXT,
    risk_grade TEXT,
    verification_method TEXT,
    verification_result TEXT,
    sentinel_confidence REAL,
    overseer_did TEXT,
    overseer_decision TEXT,
    gdpr_trigger INTEGER NOT NULL DEFAULT 0,
    payload TEXT,
    entry_hash TEXT NOT NULL UNIQUE,
    prev_hash TEXT NOT NULL,
    signature TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_soa_timestamp ON soa_ledger(timestamp);
CREATE INDEX IF NOT EXISTS idx_soa_agent ON soa_ledger(agent_did);
CREATE INDEX IF NOT EXISTS idx_soa_artifact ON soa_ledger(artifact_path);
CREATE INDEX IF NOT EXISTS idx_soa_event_type ON soa_ledger(event_type);
";

const SHADOW_GENOME_V1: &str = "
CREATE TABLE IF NOT EXISTS shadow_genome (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    ledger_ref INTEGER,
    agent_did TEXT NOT NULL,
    input_vector TEXT NOT NULL,
    decision_rationale TEXT,
    environment_context TEXT,
    failure_mode TEXT NOT NULL CHECK (failure_mode IN (
        'HALLUCINATION',
        'INJECTION_VULNERABILITY',
        'LOGIC_ERROR',
        'SPEC_VIOLATION',
        'HIGH_COMPLEXITY',
        'SECRET_EXPOSURE',
        'PII_LEAK',
        'DEPENDENCY_CONFLICT',
        'TRUST_VIOLATION',
        'OTHER'
    )),
    causal_vector TEXT,
    negative_constraint TEXT,
    remediation_status TEXT NOT NULL DEFAULT 'UNRESOLVED' CHECK (remediation_status IN (
        'UNRESOLVED',
        'IN_PROGRESS',
        'RESOLVED',
        'WONT_FIX',
        'SUPERSEDED'
    )),
    remediation_notes TEXT,
    resolved_at TEXT,
    resolved_by TEXT
);
CREATE INDEX IF NOT EXISTS idx_shadow_agent ON shadow_genome(agent_did);
CREATE INDEX IF NOT EXISTS idx_shadow_failure_mode ON shadow_genome(failure_mode);
CREATE INDEX IF NOT EXISTS idx_shadow_status ON shadow_genome(remediation_status);
CREATE INDEX IF NOT EXISTS idx_shadow_created ON shadow_genome(created_at);
";

pub(crate) fn ledger_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: SchemaVersion::new(1, 0, 0),
            description: "SOA ledger base schema",
            up: vec![MigrationStep::Sql(SOA_LEDGER_V1)],
            down: vec![MigrationStep::Sql("DROP TABLE IF EXISTS soa_ledger")],
        },
        Migration {
            version: SchemaVersion::new(2, 0, 0),
            description: "Add schema_version and extension_version columns",
            up: vec![
                MigrationStep::AddColumn {
                    table: "soa_ledger",
                    column: "schema_version",
                    definition: "INTEGER DEFAULT 1",
                },
                MigrationStep::AddColumn {
                    table: "soa_ledger",
                    column: "extension_version",
                    definition: "TEXT DEFAULT ''",
                },
            ],
            down: vec![
                MigrationStep::DropColumn {
                    table: "soa_ledger",
                    column: "extension_version",
                },
                MigrationStep::DropColumn {
                    table: "soa_ledger",
                    column: "schema_version",
                },
            ],
        },
    ]
}

pub(crate) fn shadow_genome_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: SchemaVersion::new(1, 0, 0),
            description: "Shadow genome base schema",
            up: vec![MigrationStep::Sql(SHADOW_GENOME_V1)],
            down: vec![MigrationStep::Sql("DROP TABLE IF EXISTS shadow_genome")],
        },
        Migration {
            version: SchemaVersion::new(1, 1, 0),
            description: "Add signature fields for archived failures",
            up: vec![
                MigrationStep::AddColumn {
                    table: "shadow_genome",
                    column: "did_hash",
                    definition: "TEXT",
                },
                MigrationStep::AddColumn {
                    table: "shadow_genome",
                    column: "signature",
                    definition: "TEXT",
                },
                MigrationStep::AddColumn {
                    table: "shadow_genome",
                    column: "signature_timestamp",
                    definition: "TEXT",
                },
                MigrationStep::Sql(
                    "CREATE INDEX IF NOT EXISTS idx_shadow_did_hash ON shadow_genome(did_hash)",
                ),
            ],
            down: vec![
                MigrationStep::Sql("DROP INDEX IF EXISTS idx_shadow_did_hash"),
                MigrationStep::DropColumn {
                    table: "shadow_genome",
                    column: "signature_timestamp",
                },
                MigrationStep::DropColumn {
                    table: "shadow_genome",
                    column: "signature",
                },
                MigrationStep::DropColumn {
                    table: "shadow_genome",
                    column: "did_hash",
                },
            ],
        },
        Migration {
            version: SchemaVersion::new(1, 2, 0),
            description: "Add audit attribution columns",
            up: vec![
                MigrationStep::AddColumn {
                    table: "shadow_genome",
                    column: "created_by",
                    definition: "TEXT",
                },
                MigrationStep::AddColumn {
                    table: "shadow_genome",
                    column: "updated_by",
                    definition: "TEXT",
                },
            ],
            down: vec![
                MigrationStep::DropColumn {
                    table: "shadow_genome",
                    column: "updated_by",
                },
                MigrationStep::DropColumn {
                    table: "shadow_genome",
                    column: "created_by",
                },
            ],
        },
    ]
}
