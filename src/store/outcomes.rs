use super::{new_row_id, sql, Store, StoreError};
use crate::shared::TenantId;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    fn from_db(value: &str) -> Result<Self, StoreError> {
        match value {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(StoreError::InvalidValue {
                column: "outcome_log.outcome",
                value: other.to_string(),
            }),
        }
    }
}

/// One audited mutation attempt. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeLogEntry {
    pub outcome_id: String,
    pub tenant_id: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: Value,
    pub dispatched: bool,
    pub runner_workflow_id: Option<String>,
    pub outcome: Outcome,
    pub error_message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeFilter {
    pub entity_id: Option<String>,
    pub event_type: Option<String>,
    pub outcome: Option<Outcome>,
}

impl OutcomeFilter {
    pub fn entity(entity_id: &str) -> Self {
        Self {
            entity_id: Some(entity_id.to_string()),
            ..Self::default()
        }
    }
}

/// Success and error counts over a tenant's outcome log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeStats {
    pub total: u64,
    pub success: u64,
    pub error: u64,
}

type RawOutcomeRow = (OutcomeLogEntry, String, String);

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<RawOutcomeRow> {
    Ok((
        OutcomeLogEntry {
            outcome_id: row.get(0)?,
            tenant_id: row.get(1)?,
            event_type: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            payload: Value::Null,
            dispatched: row.get::<_, i64>(6)? != 0,
            runner_workflow_id: row.get(7)?,
            outcome: Outcome::Success,
            error_message: row.get(9)?,
            created_at: row.get(10)?,
        },
        row.get::<_, String>(5)?,
        row.get::<_, String>(8)?,
    ))
}

impl Store {
    /// Appends an entry and returns it with its allocated id.
    pub fn append_outcome(
        &self,
        mut entry: OutcomeLogEntry,
    ) -> Result<OutcomeLogEntry, StoreError> {
        if entry.outcome_id.is_empty() {
            entry.outcome_id = new_row_id()?;
        }
        let payload =
            serde_json::to_string(&entry.payload).map_err(|source| StoreError::Encode { source })?;

        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO outcome_log (
                    outcome_id, tenant_id, event_type, entity_type, entity_id,
                    payload, dispatched, runner_workflow_id, outcome,
                    error_message, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.outcome_id,
                    entry.tenant_id,
                    entry.event_type,
                    entry.entity_type,
                    entry.entity_id,
                    payload,
                    i64::from(entry.dispatched),
                    entry.runner_workflow_id,
                    entry.outcome.as_str(),
                    entry.error_message,
                    entry.created_at,
                ],
            )
            .map_err(sql)?;
        Ok(entry)
    }

    pub fn list_outcomes(
        &self,
        tenant_id: &TenantId,
        filter: &OutcomeFilter,
    ) -> Result<Vec<OutcomeLogEntry>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT outcome_id, tenant_id, event_type, entity_type, entity_id,
                        payload, dispatched, runner_workflow_id, outcome,
                        error_message, created_at
                 FROM outcome_log
                 WHERE tenant_id = ?1
                   AND (?2 IS NULL OR entity_id = ?2)
                   AND (?3 IS NULL OR event_type = ?3)
                   AND (?4 IS NULL OR outcome = ?4)
                 ORDER BY rowid ASC",
            )
            .map_err(sql)?;
        let rows = statement
            .query_map(
                params![
                    tenant_id.as_str(),
                    filter.entity_id,
                    filter.event_type,
                    filter.outcome.map(Outcome::as_str),
                ],
                outcome_from_row,
            )
            .map_err(sql)?;

        let mut out = Vec::new();
        for row in rows {
            let (mut entry, payload_raw, outcome_raw) = row.map_err(sql)?;
            entry.payload = serde_json::from_str(&payload_raw).map_err(|_| {
                StoreError::InvalidValue {
                    column: "outcome_log.payload",
                    value: payload_raw.clone(),
                }
            })?;
            entry.outcome = Outcome::from_db(&outcome_raw)?;
            out.push(entry);
        }
        Ok(out)
    }

    /// Counts entries by outcome, optionally for one event type only.
    pub fn outcome_stats(
        &self,
        tenant_id: &TenantId,
        event_type: Option<&str>,
    ) -> Result<OutcomeStats, StoreError> {
        let connection = self.connect()?;
        let (success, error): (i64, i64) = connection
            .query_row(
                "SELECT COALESCE(SUM(outcome = 'success'), 0),
                        COALESCE(SUM(outcome = 'error'), 0)
                 FROM outcome_log
                 WHERE tenant_id = ?1
                   AND (?2 IS NULL OR event_type = ?2)",
                params![tenant_id.as_str(), event_type],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(sql)?;
        let success = u64::try_from(success).unwrap_or(0);
        let error = u64::try_from(error).unwrap_or(0);
        Ok(OutcomeStats {
            total: success + error,
            success,
            error,
        })
    }
}
