//! Two-tier route resolution: an active tenant delegation first, then the
//! static alias table.

use super::alias::{self, AliasNotFound};
use super::EventType;
use crate::shared::{OpsLog, TenantId};
use crate::store::{DelegationRecord, Store, StoreError};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    TenantConfig,
    Alias,
}

impl RouteSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TenantConfig => "tenant-config",
            Self::Alias => "alias",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub event: EventType,
    pub webhook_path: &'static str,
    pub source: RouteSource,
    /// Set when a tenant delegation record produced the route.
    pub runner_workflow_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("no webhook route for event `{event}` (tenant {tenant_id}): {cause}")]
    Unresolvable {
        tenant_id: String,
        event: String,
        #[source]
        cause: AliasNotFound,
    },
    #[error("delegation lookup failed for event `{event}`: {source}")]
    Lookup {
        event: String,
        #[source]
        source: StoreError,
    },
}

/// Read-only access to tenant delegation records.
pub trait DelegationLookup: Send + Sync {
    fn active_delegation(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Option<DelegationRecord>, StoreError>;
}

impl DelegationLookup for Store {
    fn active_delegation(
        &self,
        tenant_id: &TenantId,
        event_type: &str,
    ) -> Result<Option<DelegationRecord>, StoreError> {
        Store::active_delegation(self, tenant_id, event_type)
    }
}

#[derive(Clone)]
pub struct RoutingResolver {
    lookup: Arc<dyn DelegationLookup>,
    ops: OpsLog,
}

impl RoutingResolver {
    pub fn new(lookup: Arc<dyn DelegationLookup>, ops: OpsLog) -> Self {
        Self { lookup, ops }
    }

    pub fn route(
        &self,
        tenant_id: &TenantId,
        event: &EventType,
    ) -> Result<ResolvedRoute, RoutingError> {
        let event_name = event.as_string();
        let record = self
            .lookup
            .active_delegation(tenant_id, &event_name)
            .map_err(|source| RoutingError::Lookup {
                event: event_name.clone(),
                source,
            })?;

        if let Some(record) = record {
            match alias::resolve(&record.runner_workflow_id) {
                Ok(webhook_path) => {
                    return Ok(ResolvedRoute {
                        event: *event,
                        webhook_path,
                        source: RouteSource::TenantConfig,
                        runner_workflow_id: Some(record.runner_workflow_id),
                    })
                }
                Err(miss) => self.ops.append(
                    "warn",
                    "routing.tenant_alias_miss",
                    &miss.to_string(),
                    &[
                        ("tenantId", json!(tenant_id.as_str())),
                        ("eventType", json!(event_name)),
                        ("delegationId", json!(record.delegation_id)),
                    ],
                ),
            }
        }

        let webhook_path =
            alias::resolve_event(event).map_err(|cause| RoutingError::Unresolvable {
                tenant_id: tenant_id.to_string(),
                event: event_name,
                cause,
            })?;
        Ok(ResolvedRoute {
            event: *event,
            webhook_path,
            source: RouteSource::Alias,
            runner_workflow_id: None,
        })
    }
}
