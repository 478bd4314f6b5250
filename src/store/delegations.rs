use super::{new_row_id, sql, Store, StoreError};
use crate::shared::{now_rfc3339, TenantId};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Active,
    Inactive,
}

impl DelegationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    fn from_db(value: &str) -> Result<Self, StoreError> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(StoreError::InvalidValue {
                column: "delegations.status",
                value: other.to_string(),
            }),
        }
    }
}

/// Tenant configuration routing one event to a runner workflow. The
/// dispatch layer reads these; only tenant configuration writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationRecord {
    pub delegation_id: String,
    pub tenant_id: String,
    pub event_type: String,
    pub runner_workflow_id: String,
    pub status: DelegationStatus,
    pub created_at: String,
    pub updated_at: String,
}

const DELEGATION_COLUMNS: &str = "delegation_id, tenant_id, event_type, runner_workflow_id, \
     status, created_at, updated_at";

fn delegation_from_row(row: &Row<'_>) -> rusqlite::Result<(DelegationRecord, String)> {
    let status_raw: String = row.get(4)?;
    Ok((
        DelegationRecord {
            delegation_id: row.get(0)?,
            tenant_id: row.get(1)?,
            event_type: row.get(2)?,
            runner_workflow_id: row.get(3)?,
            status: DelegationStatus::Inactive,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        },
        status_raw,
    ))
}

fn finish_row(
    (mut record, status_raw): (DelegationRecord, String),
) -> Result<DelegationRecord, StoreError> {
    record.status = DelegationStatus::from_db(&status_raw)?;
    Ok(record)
}

impl Store {
    pub fn active_delegation(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Option<DelegationRecord>, StoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!(
                    "SELECT {DELEGATION_COLUMNS} FROM delegations
                     WHERE tenant_id = ?1 AND event_type = ?2 AND status = 'active'
                     LIMIT 1"
                ),
                params![tenant_id.as_str(), event_type],
                delegation_from_row,
            )
            .optional()
            .map_err(sql)?;
        row.map(finish_row).transpose()
    }

    /// Makes `runner_workflow_id` the single active delegation for
    /// (tenant, event); a previously active record is retired, not deleted.
    pub fn activate_delegation(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
        runner_workflow_id: &str,
    ) -> Result<DelegationRecord, StoreError> {
        let now = now_rfc3339();
        let delegation_id = new_row_id()?;
        let mut connection = self.connect()?;
        let tx = connection.transaction().map_err(sql)?;
        tx.execute(
            "UPDATE delegations SET status = 'inactive', updated_at = ?3
             WHERE tenant_id = ?1 AND event_type = ?2 AND status = 'active'",
            params![tenant_id.as_str(), event_type, now],
        )
        .map_err(sql)?;
        tx.execute(
            "INSERT INTO delegations (
                delegation_id, tenant_id, event_type, runner_workflow_id,
                status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
            params![
                delegation_id,
                tenant_id.as_str(),
                event_type,
                runner_workflow_id,
                now
            ],
        )
        .map_err(sql)?;
        tx.commit().map_err(sql)?;

        Ok(DelegationRecord {
            delegation_id,
            tenant_id: tenant_id.to_string(),
            event_type: event_type.to_string(),
            runner_workflow_id: runner_workflow_id.to_string(),
            status: DelegationStatus::Active,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Returns whether an active record was retired.
    pub fn deactivate_delegation(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<bool, StoreError> {
        let connection = self.connect()?;
        let changed = connection
            .execute(
                "UPDATE delegations SET status = 'inactive', updated_at = ?3
                 WHERE tenant_id = ?1 AND event_type = ?2 AND status = 'active'",
                params![tenant_id.as_str(), event_type, now_rfc3339()],
            )
            .map_err(sql)?;
        Ok(changed > 0)
    }

    pub fn list_delegations(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<DelegationRecord>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT {DELEGATION_COLUMNS} FROM delegations
                 WHERE tenant_id = ?1
                 ORDER BY event_type ASC, rowid ASC"
            ))
            .map_err(sql)?;
        let rows = statement
            .query_map(params![tenant_id.as_str()], delegation_from_row)
            .map_err(sql)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(finish_row(row.map_err(sql)?)?);
        }
        Ok(out)
    }
}
