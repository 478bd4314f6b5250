//! Audit trail writer for mutation attempts.

use crate::dispatch::EventType;
use crate::shared::{now_rfc3339, OpsLog, TenantId};
use crate::store::{FailureNotification, Outcome, OutcomeLogEntry, Store};
use serde_json::{json, Value};

/// One attempted mutation, local or delegated.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub tenant_id: TenantId,
    pub event: EventType,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: Value,
    pub dispatched: bool,
    pub runner_workflow_id: Option<String>,
    pub outcome: Outcome,
    pub error_message: Option<String>,
}

impl OutcomeRecord {
    pub fn success(
        tenant_id: &TenantId,
        event: EventType,
        entity_type: &str,
        entity_id: &str,
        payload: Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.clone(),
            event,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            dispatched: false,
            runner_workflow_id: None,
            outcome: Outcome::Success,
            error_message: None,
        }
    }

    pub fn failure(
        tenant_id: &TenantId,
        event: EventType,
        entity_type: &str,
        entity_id: &str,
        payload: Value,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            outcome: Outcome::Error,
            error_message: Some(error_message.into()),
            ..Self::success(tenant_id, event, entity_type, entity_id, payload)
        }
    }

    pub fn dispatched(mut self, runner_workflow_id: Option<String>) -> Self {
        self.dispatched = true;
        self.runner_workflow_id = runner_workflow_id;
        self
    }

    pub fn with_dispatched(mut self, dispatched: bool) -> Self {
        self.dispatched = dispatched;
        self
    }

    pub fn with_workflow(mut self, runner_workflow_id: Option<String>) -> Self {
        self.runner_workflow_id = runner_workflow_id;
        self
    }
}

/// What [`OutcomeLog::record`] managed to persist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recorded {
    pub entry: Option<OutcomeLogEntry>,
    pub notification: Option<FailureNotification>,
}

/// Writes outcome entries plus failure notifications. Never returns an
/// error: store failures are reported to the operational log only.
#[derive(Debug, Clone)]
pub struct OutcomeLog {
    store: Store,
    ops: OpsLog,
}

impl OutcomeLog {
    pub fn new(store: Store, ops: OpsLog) -> Self {
        Self { store, ops }
    }

    pub fn record(&self, record: OutcomeRecord) -> Recorded {
        let event_type = record.event.as_string();
        let created_at = now_rfc3339();
        let entry = OutcomeLogEntry {
            outcome_id: String::new(),
            tenant_id: record.tenant_id.to_string(),
            event_type: event_type.clone(),
            entity_type: record.entity_type.clone(),
            entity_id: record.entity_id.clone(),
            payload: record.payload,
            dispatched: record.dispatched,
            runner_workflow_id: record.runner_workflow_id,
            outcome: record.outcome,
            error_message: record.error_message.clone(),
            created_at: created_at.clone(),
        };

        let mut recorded = Recorded::default();
        match self.store.append_outcome(entry) {
            Ok(entry) => recorded.entry = Some(entry),
            Err(err) => self.report_failure(
                "outcome.record.failed",
                &err.to_string(),
                &record.tenant_id,
                &event_type,
                &record.entity_id,
            ),
        }

        if record.outcome == Outcome::Error {
            let message = record
                .error_message
                .unwrap_or_else(|| "unknown error".to_string());
            let notification = FailureNotification {
                notification_id: String::new(),
                tenant_id: record.tenant_id.to_string(),
                kind: format!("{event_type}_error"),
                title: format!("Error: {event_type}"),
                message,
                data: json!({
                    "entityType": record.entity_type,
                    "entityId": record.entity_id,
                    "eventType": event_type,
                }),
                read: false,
                created_at,
            };
            match self.store.insert_notification(notification) {
                Ok(notification) => recorded.notification = Some(notification),
                Err(err) => self.report_failure(
                    "outcome.notify.failed",
                    &err.to_string(),
                    &record.tenant_id,
                    &event_type,
                    &record.entity_id,
                ),
            }
        }

        recorded
    }

    fn report_failure(
        &self,
        event: &str,
        message: &str,
        tenant_id: &TenantId,
        event_type: &str,
        entity_id: &str,
    ) {
        self.ops.append(
            "error",
            event,
            message,
            &[
                ("tenantId", json!(tenant_id.as_str())),
                ("eventType", json!(event_type)),
                ("entityId", json!(entity_id)),
            ],
        );
    }
}
