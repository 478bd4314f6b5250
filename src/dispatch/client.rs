use super::case::{from_runner_case, to_runner_case};
use super::routing::{ResolvedRoute, RouteSource, RoutingError, RoutingResolver};
use super::transport::{RunnerTransport, TransportError, TransportResponse};
use super::{EventType, SideEffectKind};
use crate::origin::CallerSession;
use crate::outcome::{OutcomeLog, OutcomeRecord};
use crate::runtime::{
    RuntimeError, SideEffectHandler, SideEffectJob, SideEffectQueue, SideEffectQueueConfig,
    Submission,
};
use crate::shared::{now_rfc3339, OpsLog, TenantId};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("runner base url is not configured; cannot dispatch `{event}`")]
    RunnerNotConfigured { event: String },
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("runner returned HTTP {status} for `{event}`: {body}")]
    Status {
        event: String,
        status: u16,
        body: String,
    },
    #[error("runner call for `{event}` timed out after {timeout_secs}s")]
    Timeout { event: String, timeout_secs: u64 },
    #[error("runner call for `{event}` failed: {message}")]
    Transport { event: String, message: String },
    #[error("runner response for `{event}` is not valid json: {message}")]
    InvalidBody { event: String, message: String },
    #[error("side effect `{event}` cannot be triggered by itself")]
    Reentrant { event: String },
}

impl DispatchError {
    /// Misconfiguration, as opposed to a failing runner.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::RunnerNotConfigured { .. }
                | Self::Reentrant { .. }
                | Self::Routing(RoutingError::Unresolvable { .. })
        )
    }

    /// Whether an outbound request was actually attempted.
    pub fn reached_runner(&self) -> bool {
        matches!(
            self,
            Self::Status { .. }
                | Self::Timeout { .. }
                | Self::Transport { .. }
                | Self::InvalidBody { .. }
        )
    }
}

/// Request body sent to a runner webhook. The payload appears twice: its
/// fields flattened at the top level and whole under `data`. Envelope
/// fields take precedence over same-named payload fields.
pub fn build_envelope(
    event: &EventType,
    tenant_id: &TenantId,
    timestamp: &str,
    payload: &Value,
) -> Value {
    let runner_payload = to_runner_case(payload);
    let mut body = Map::new();
    if let Value::Object(fields) = &runner_payload {
        for (key, value) in fields {
            body.insert(key.clone(), value.clone());
        }
    }
    body.insert("event".to_string(), json!(event.as_string()));
    body.insert("tenantId".to_string(), json!(tenant_id.as_str()));
    body.insert("timestamp".to_string(), json!(timestamp));
    body.insert("data".to_string(), runner_payload);
    Value::Object(body)
}

/// Routing plus the outbound HTTP call, shared by synchronous calls and the
/// side-effect workers.
pub struct DispatchCore {
    base_url: Option<String>,
    timeout: Duration,
    transport: Arc<dyn RunnerTransport>,
    resolver: RoutingResolver,
    ops: OpsLog,
}

impl DispatchCore {
    pub fn new(
        base_url: Option<&str>,
        timeout: Duration,
        transport: Arc<dyn RunnerTransport>,
        resolver: RoutingResolver,
        ops: OpsLog,
    ) -> Self {
        let base_url = base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Self {
            base_url,
            timeout,
            transport,
            resolver,
            ops,
        }
    }

    pub fn runner_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// GETs `{base}/healthz`. Never fails; an unreachable or unconfigured
    /// runner is reported in the result.
    pub fn check_runner(&self) -> RunnerHealth {
        let Some(base) = self.base_url.as_deref() else {
            return RunnerHealth {
                reachable: false,
                status: None,
                message: "runner base url is not configured".to_string(),
            };
        };
        let url = format!("{base}/healthz");
        let health = match self.transport.get(&url, self.timeout) {
            Ok(response) if response.is_success() => RunnerHealth {
                reachable: true,
                status: Some(response.status),
                message: "runner is reachable".to_string(),
            },
            Ok(response) => RunnerHealth {
                reachable: false,
                status: Some(response.status),
                message: format!("runner answered with HTTP {}", response.status),
            },
            Err(err) => RunnerHealth {
                reachable: false,
                status: None,
                message: format!("cannot reach runner: {err}"),
            },
        };
        let level = if health.reachable { "info" } else { "warn" };
        self.ops.append(
            level,
            "dispatch.runner.checked",
            &health.message,
            &[("url", json!(url))],
        );
        health
    }

    pub fn route(
        &self,
        tenant_id: &TenantId,
        event: &EventType,
    ) -> Result<ResolvedRoute, DispatchError> {
        Ok(self.resolver.route(tenant_id, event)?)
    }

    pub fn webhook_url(&self, route: &ResolvedRoute) -> Result<String, DispatchError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| DispatchError::RunnerNotConfigured {
                event: route.event.as_string(),
            })?;
        Ok(format!("{base}/webhook/{}", route.webhook_path))
    }

    /// POSTs the envelope and requires a 2xx status.
    pub fn send(
        &self,
        tenant_id: &TenantId,
        route: &ResolvedRoute,
        payload: &Value,
    ) -> Result<TransportResponse, DispatchError> {
        let event = route.event.as_string();
        let url = self.webhook_url(route)?;
        let envelope = build_envelope(&route.event, tenant_id, &now_rfc3339(), payload);

        let result = self
            .transport
            .post_json(&url, &envelope, self.timeout)
            .map_err(|err| match err {
                TransportError::Timeout { timeout_secs } => DispatchError::Timeout {
                    event: event.clone(),
                    timeout_secs,
                },
                TransportError::Io(message) => DispatchError::Transport {
                    event: event.clone(),
                    message,
                },
            })
            .and_then(|response| {
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(DispatchError::Status {
                        event: event.clone(),
                        status: response.status,
                        body: truncate(&response.body, ERROR_BODY_LIMIT),
                    })
                }
            });

        let fields = [
            ("tenantId", json!(tenant_id.as_str())),
            ("eventType", json!(event)),
            ("webhookPath", json!(route.webhook_path)),
            ("routeSource", json!(route.source.as_str())),
        ];
        match &result {
            Ok(response) => self.ops.append(
                "info",
                "dispatch.call.completed",
                &format!("status={}", response.status),
                &fields,
            ),
            Err(err) => self
                .ops
                .append("warn", "dispatch.call.failed", &err.to_string(), &fields),
        }
        result
    }

    /// [`send`](Self::send), then parses the body and converts keys back to
    /// local casing.
    pub fn deliver(
        &self,
        tenant_id: &TenantId,
        route: &ResolvedRoute,
        payload: &Value,
    ) -> Result<Value, DispatchError> {
        let response = self.send(tenant_id, route, payload)?;
        let parsed: Value =
            serde_json::from_str(&response.body).map_err(|err| DispatchError::InvalidBody {
                event: route.event.as_string(),
                message: err.to_string(),
            })?;
        Ok(from_runner_case(&parsed))
    }
}

impl SideEffectHandler for DispatchCore {
    fn run(&self, job: &SideEffectJob) -> Result<(), String> {
        self.send(&job.tenant_id, &job.route, &job.payload)
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

fn truncate(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        return body.to_string();
    }
    let mut out: String = body.chars().take(limit).collect();
    out.push_str("...");
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerHealth {
    pub reachable: bool,
    pub status: Option<u16>,
    pub message: String,
}

/// The runner's answer to a synchronous call.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched<T> {
    pub route: ResolvedRoute,
    pub data: T,
}

/// A side effect together with the event that caused it. The two may never
/// be the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideEffectTrigger {
    triggered_by: EventType,
    effect: SideEffectKind,
}

impl SideEffectTrigger {
    pub fn new(triggered_by: EventType, effect: SideEffectKind) -> Result<Self, DispatchError> {
        if triggered_by == EventType::SideEffect(effect) {
            return Err(DispatchError::Reentrant {
                event: triggered_by.as_string(),
            });
        }
        Ok(Self {
            triggered_by,
            effect,
        })
    }

    pub fn event(&self) -> EventType {
        EventType::SideEffect(self.effect)
    }

    pub fn triggered_by(&self) -> EventType {
        self.triggered_by
    }
}

/// The entity a side effect is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

#[derive(Clone)]
pub struct DispatchClient {
    core: Arc<DispatchCore>,
    side_effects: SideEffectQueue,
    outcomes: OutcomeLog,
}

impl DispatchClient {
    /// Starts the side-effect workers with `core` as their handler.
    pub fn start(
        core: Arc<DispatchCore>,
        queue: SideEffectQueueConfig,
        outcomes: OutcomeLog,
        ops: OpsLog,
    ) -> Result<Self, RuntimeError> {
        let handler: Arc<dyn SideEffectHandler> = core.clone();
        let side_effects = SideEffectQueue::start(queue, handler, outcomes.clone(), ops)?;
        Ok(Self {
            core,
            side_effects,
            outcomes,
        })
    }

    pub fn core(&self) -> &DispatchCore {
        &self.core
    }

    pub fn side_effects(&self) -> &SideEffectQueue {
        &self.side_effects
    }

    pub fn route(
        &self,
        tenant_id: &TenantId,
        event: &EventType,
    ) -> Result<ResolvedRoute, DispatchError> {
        self.core.route(tenant_id, event)
    }

    /// Resolves the route for the caller's tenant and waits for the runner's
    /// result. Only primary callers hold a [`CallerSession`].
    pub fn call_and_wait<T: DeserializeOwned>(
        &self,
        caller: &CallerSession,
        event: &EventType,
        payload: &Value,
    ) -> Result<Dispatched<T>, DispatchError> {
        let route = self.core.route(caller.tenant_id(), event)?;
        self.call_route(caller, route, payload)
    }

    /// Like [`call_and_wait`](Self::call_and_wait) with a route the caller
    /// already resolved for the same tenant.
    pub fn call_route<T: DeserializeOwned>(
        &self,
        caller: &CallerSession,
        route: ResolvedRoute,
        payload: &Value,
    ) -> Result<Dispatched<T>, DispatchError> {
        let value = self.core.deliver(caller.tenant_id(), &route, payload)?;
        let data = serde_json::from_value(value).map_err(|err| DispatchError::InvalidBody {
            event: route.event.as_string(),
            message: err.to_string(),
        })?;
        Ok(Dispatched { route, data })
    }

    /// Queues a side effect and returns at once. Delivery only happens when
    /// the tenant has delegated the side-effect event; failures end up in
    /// the outcome log, never in the caller's result.
    pub fn fire_and_forget(
        &self,
        trigger: SideEffectTrigger,
        tenant_id: &TenantId,
        entity: EntityRef,
        payload: Value,
    ) -> Submission {
        let event = trigger.event();
        let route = match self.core.route(tenant_id, &event) {
            Ok(route) => route,
            Err(err) => {
                let reason = err.to_string();
                self.outcomes.record(OutcomeRecord::failure(
                    tenant_id,
                    event,
                    &entity.entity_type,
                    &entity.entity_id,
                    payload,
                    reason.clone(),
                ));
                return Submission::Rejected { reason };
            }
        };

        if route.source != RouteSource::TenantConfig {
            self.side_effects.note_skipped();
            return Submission::Skipped {
                reason: format!("no delegation configured for `{event}`"),
            };
        }
        if !self.core.runner_configured() {
            self.side_effects.note_skipped();
            return Submission::Skipped {
                reason: "runner base url is not configured".to_string(),
            };
        }

        self.side_effects.submit(SideEffectJob {
            tenant_id: tenant_id.clone(),
            event,
            triggered_by: trigger.triggered_by(),
            entity_type: entity.entity_type,
            entity_id: entity.entity_id,
            route,
            payload,
        })
    }

    pub fn shutdown(&self) {
        self.side_effects.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{DocumentAction, DocumentKind};

    #[test]
    fn envelope_fields_win_over_payload_fields() {
        let tenant = TenantId::parse("14141414-1414-4414-8414-141414141414").expect("tenant");
        let event = EventType::document(DocumentKind::CreditNote, DocumentAction::Create);
        let body = build_envelope(
            &event,
            &tenant,
            "2024-03-01T10:00:00.000Z",
            &json!({"clientId": "c-1", "event": "spoofed"}),
        );
        assert_eq!(body["event"], json!("credit_note_create"));
        assert_eq!(body["tenantId"], json!(tenant.as_str()));
        assert_eq!(body["client_id"], json!("c-1"));
        assert_eq!(body["data"], json!({"client_id": "c-1", "event": "spoofed"}));
        assert_eq!(body["timestamp"], json!("2024-03-01T10:00:00.000Z"));
    }

    #[test]
    fn a_side_effect_cannot_trigger_itself() {
        let effect = SideEffectKind::AccountingAutoPost;
        assert!(SideEffectTrigger::new(EventType::SideEffect(effect), effect).is_err());
        let trigger = SideEffectTrigger::new(
            EventType::document(DocumentKind::Invoice, DocumentAction::Validate),
            effect,
        )
        .expect("trigger");
        assert_eq!(trigger.event(), EventType::SideEffect(effect));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(600);
        assert_eq!(truncate(&body, ERROR_BODY_LIMIT).len(), ERROR_BODY_LIMIT + 3);
        assert_eq!(truncate("short", ERROR_BODY_LIMIT), "short");
    }
}
