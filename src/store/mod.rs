//! Tenant-scoped relational store backed by SQLite.
//!
//! Every query filters on `tenant_id`; nothing in this module joins data
//! across tenants. Connections are opened per operation so a `Store` is a
//! cheap, thread-safe handle that can be cloned into worker threads.

pub mod delegations;
pub mod documents;
pub mod notifications;
pub mod outcomes;

pub use delegations::{DelegationRecord, DelegationStatus};
pub use documents::NewDocument;
pub use notifications::FailureNotification;
pub use outcomes::{Outcome, OutcomeFilter, OutcomeLogEntry, OutcomeStats};

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create store parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to encode json column: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid `{column}` value `{value}` in database")]
    InvalidValue { column: &'static str, value: String },
    #[error("failed to allocate id: {0}")]
    IdAllocation(String),
}

pub(crate) fn sql(source: rusqlite::Error) -> StoreError {
    StoreError::Sql { source }
}

#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        let _ = store.connect()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS delegations (
                    delegation_id TEXT NOT NULL PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    runner_workflow_id TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('active', 'inactive')),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_delegations_one_active
                    ON delegations(tenant_id, event_type)
                    WHERE status = 'active';

                CREATE TABLE IF NOT EXISTS outcome_log (
                    outcome_id TEXT NOT NULL PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    dispatched INTEGER NOT NULL,
                    runner_workflow_id TEXT,
                    outcome TEXT NOT NULL CHECK (outcome IN ('success', 'error')),
                    error_message TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_outcome_log_tenant_entity
                    ON outcome_log(tenant_id, entity_id);

                CREATE TRIGGER IF NOT EXISTS outcome_log_no_update
                    BEFORE UPDATE ON outcome_log
                    BEGIN SELECT RAISE(ABORT, 'outcome_log is append-only'); END;

                CREATE TRIGGER IF NOT EXISTS outcome_log_no_delete
                    BEFORE DELETE ON outcome_log
                    BEGIN SELECT RAISE(ABORT, 'outcome_log is append-only'); END;

                CREATE TABLE IF NOT EXISTS notifications (
                    notification_id TEXT NOT NULL PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    title TEXT NOT NULL,
                    message TEXT NOT NULL,
                    data TEXT NOT NULL,
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_notifications_tenant
                    ON notifications(tenant_id, read);

                CREATE TABLE IF NOT EXISTS documents (
                    document_id TEXT NOT NULL PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    number TEXT NOT NULL,
                    sequence_number INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    client_id TEXT NOT NULL,
                    amount_excl_tax REAL NOT NULL,
                    tax_rate REAL NOT NULL,
                    amount_incl_tax REAL NOT NULL,
                    note TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_tenant_number
                    ON documents(tenant_id, number);
                CREATE INDEX IF NOT EXISTS idx_documents_tenant_kind
                    ON documents(tenant_id, kind, status);

                CREATE TABLE IF NOT EXISTS document_sequences (
                    tenant_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    year INTEGER NOT NULL,
                    last_sequence INTEGER NOT NULL,
                    PRIMARY KEY (tenant_id, kind, year)
                );
                ",
            )
            .map_err(sql)?;
        Ok(())
    }

    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "
                SELECT name FROM sqlite_master
                WHERE type = 'table'
                ORDER BY name ASC
                ",
            )
            .map_err(sql)?;

        let rows = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql)?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row.map_err(sql)?);
        }
        Ok(names)
    }

    pub(crate) fn connect(&self) -> Result<Connection, StoreError> {
        let connection = Connection::open(&self.db_path).map_err(|source| StoreError::Open {
            path: self.db_path.display().to_string(),
            source,
        })?;
        connection.busy_timeout(BUSY_TIMEOUT).map_err(sql)?;
        connection
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(sql)?;
        Ok(connection)
    }
}

pub(crate) fn new_row_id() -> Result<String, StoreError> {
    crate::shared::generate_uuid_v4().map_err(StoreError::IdAllocation)
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_store;

    #[test]
    fn ensure_schema_is_idempotent_and_creates_all_tables() {
        let (_dir, store) = temp_store();
        store.ensure_schema().expect("second run");
        let names = store.table_names().expect("tables");
        for table in ["delegations", "documents", "notifications", "outcome_log"] {
            assert!(names.iter().any(|name| name == table), "missing {table}");
        }
    }
}
