//! The dual-path mutation state machine.
//!
//! Every mutating operation moves through
//! `Received → {Delegated | LocalDirect} → Logged → Responded`. Runner
//! callbacks always take the local path. Primary callers are delegated when
//! the tenant configured a delegation (or local fallback is disabled for the
//! event), and a failed delegation is returned as an upstream error; it is
//! never retried locally.

use super::{
    plan_transition, CreateDocumentInput, DocumentAction, DocumentError, DocumentKind,
    DocumentListQuery, DomainDocument, Transition,
};
use crate::config::LocalFallbackConfig;
use crate::dispatch::{
    plan_primary_mutation, plan_primary_read, DispatchClient, EntityRef, EventType,
    ExecutionPath, ResolvedRoute, SideEffectKind, SideEffectTrigger,
};
use crate::origin::{CallerSession, RequestOrigin};
use crate::outcome::{OutcomeLog, OutcomeRecord};
use crate::runtime::Submission;
use crate::shared::{current_year, DocumentId, OpsLog, TenantId};
use crate::store::{NewDocument, Store};
use serde_json::{json, Value};

/// Id recorded for a delegated create that failed before the runner
/// assigned one.
const PENDING_ENTITY_ID: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Received,
    Delegated,
    LocalDirect,
    Logged,
    Responded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReply {
    pub created: bool,
    pub message: Option<String>,
    pub data: Value,
    pub path: ExecutionPath,
    pub phases: Vec<MutationPhase>,
    pub side_effects: Vec<Submission>,
}

enum Plan<'a> {
    Delegate {
        caller: &'a CallerSession,
        route: ResolvedRoute,
    },
    Local,
}

#[derive(Clone)]
pub struct DocumentService {
    store: Store,
    dispatch: DispatchClient,
    outcomes: OutcomeLog,
    fallback: LocalFallbackConfig,
    ops: OpsLog,
}

impl DocumentService {
    pub fn new(
        store: Store,
        dispatch: DispatchClient,
        outcomes: OutcomeLog,
        fallback: LocalFallbackConfig,
        ops: OpsLog,
    ) -> Self {
        Self {
            store,
            dispatch,
            outcomes,
            fallback,
            ops,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn dispatch(&self) -> &DispatchClient {
        &self.dispatch
    }

    pub fn list(
        &self,
        origin: &RequestOrigin,
        kind: DocumentKind,
        query: &DocumentListQuery,
    ) -> Result<ServiceReply, DocumentError> {
        let event = EventType::document(kind, DocumentAction::List);
        let mut phases = vec![MutationPhase::Received];
        match self.plan_read(origin, &event)? {
            Plan::Delegate { caller, route } => {
                phases.push(MutationPhase::Delegated);
                let payload = json!({
                    "status": query.status.map(|status| status.as_str()),
                    "page": query.page,
                    "limit": query.limit,
                });
                let dispatched = self.dispatch.call_route::<Value>(caller, route, &payload)?;
                phases.push(MutationPhase::Responded);
                Ok(reply(
                    false,
                    None,
                    dispatched.data,
                    ExecutionPath::Delegated(dispatched.route),
                    phases,
                ))
            }
            Plan::Local => {
                phases.push(MutationPhase::LocalDirect);
                let (items, total) = self.store.list_documents(origin.tenant_id(), kind, query)?;
                phases.push(MutationPhase::Responded);
                Ok(reply(
                    false,
                    None,
                    json!({
                        "items": items,
                        "total": total,
                        "page": query.page,
                        "limit": query.limit,
                    }),
                    ExecutionPath::LocalDirect,
                    phases,
                ))
            }
        }
    }

    pub fn get(
        &self,
        origin: &RequestOrigin,
        kind: DocumentKind,
        raw_id: &str,
    ) -> Result<ServiceReply, DocumentError> {
        let event = EventType::document(kind, DocumentAction::Get);
        let id = parse_document_id(kind, raw_id)?;
        let mut phases = vec![MutationPhase::Received];
        match self.plan_read(origin, &event)? {
            Plan::Delegate { caller, route } => {
                phases.push(MutationPhase::Delegated);
                let dispatched = self.dispatch.call_route::<Value>(
                    caller,
                    route,
                    &json!({"id": id.as_str()}),
                )?;
                phases.push(MutationPhase::Responded);
                Ok(reply(
                    false,
                    None,
                    dispatched.data,
                    ExecutionPath::Delegated(dispatched.route),
                    phases,
                ))
            }
            Plan::Local => {
                phases.push(MutationPhase::LocalDirect);
                let document = self.load_live(origin.tenant_id(), kind, &id)?;
                phases.push(MutationPhase::Responded);
                Ok(reply(
                    false,
                    None,
                    to_json(&document),
                    ExecutionPath::LocalDirect,
                    phases,
                ))
            }
        }
    }

    pub fn create(
        &self,
        origin: &RequestOrigin,
        kind: DocumentKind,
        body: &Value,
    ) -> Result<ServiceReply, DocumentError> {
        let event = EventType::document(kind, DocumentAction::Create);
        let mut phases = vec![MutationPhase::Received];
        authorize(origin, DocumentAction::Create)?;
        let input = CreateDocumentInput::from_body(body).map_err(DocumentError::Validation)?;
        let tenant_id = origin.tenant_id();

        match self.plan_mutation(origin, &event)? {
            Plan::Delegate { caller, route } => {
                let payload = to_json(&input);
                let (route, data) = self.delegate_mutation(
                    caller,
                    route,
                    kind,
                    PENDING_ENTITY_ID,
                    &payload,
                    &mut phases,
                )?;
                Ok(reply(
                    true,
                    Some(format!("{} submitted to runner", kind.entity_type())),
                    data,
                    ExecutionPath::Delegated(route),
                    phases,
                ))
            }
            Plan::Local => {
                phases.push(MutationPhase::LocalDirect);
                let new = NewDocument {
                    id: DocumentId::generate().map_err(DocumentError::Internal)?,
                    tenant_id: tenant_id.clone(),
                    kind,
                    input,
                };
                let workflow = self.local_workflow_id(tenant_id, &event);
                match self.store.insert_numbered_document(&new, current_year()) {
                    Ok(document) => {
                        let data = to_json(&document);
                        self.outcomes.record(
                            OutcomeRecord::success(
                                tenant_id,
                                event,
                                kind.entity_type(),
                                document.id.as_str(),
                                data.clone(),
                            )
                            .with_workflow(workflow)
                            .with_dispatched(origin.is_callback()),
                        );
                        phases.push(MutationPhase::Logged);
                        let side_effects = self.issue_side_effects(&event, &document);
                        phases.push(MutationPhase::Responded);
                        let mut out = reply(
                            true,
                            Some(format!("{} {} created", kind.entity_type(), document.number)),
                            data,
                            ExecutionPath::LocalDirect,
                            phases,
                        );
                        out.side_effects = side_effects;
                        Ok(out)
                    }
                    Err(err) => {
                        self.outcomes.record(
                            OutcomeRecord::failure(
                                tenant_id,
                                event,
                                kind.entity_type(),
                                new.id.as_str(),
                                to_json(&new.input),
                                err.to_string(),
                            )
                            .with_workflow(workflow)
                            .with_dispatched(origin.is_callback()),
                        );
                        Err(err.into())
                    }
                }
            }
        }
    }

    /// `validate`, `settle`, `cancel` and `delete` on an existing document.
    pub fn transition(
        &self,
        origin: &RequestOrigin,
        kind: DocumentKind,
        raw_id: &str,
        action: DocumentAction,
    ) -> Result<ServiceReply, DocumentError> {
        if !action.is_mutation() || action == DocumentAction::Create {
            return Err(DocumentError::Validation(format!(
                "`{}` is not a lifecycle transition",
                action.as_str()
            )));
        }
        let event = EventType::document(kind, action);
        let mut phases = vec![MutationPhase::Received];
        authorize(origin, action)?;
        let id = parse_document_id(kind, raw_id)?;
        let tenant_id = origin.tenant_id();

        let document = self.load_live(tenant_id, kind, &id)?;
        let transition = plan_transition(document.status, action)?;

        match self.plan_mutation(origin, &event)? {
            Plan::Delegate { caller, route } => {
                let payload = json!({
                    "id": document.id.as_str(),
                    "number": document.number,
                    "status": document.status.as_str(),
                });
                let (route, data) = self.delegate_mutation(
                    caller,
                    route,
                    kind,
                    document.id.as_str(),
                    &payload,
                    &mut phases,
                )?;
                Ok(reply(
                    false,
                    Some(format!("{} submitted to runner", action.as_str())),
                    data,
                    ExecutionPath::Delegated(route),
                    phases,
                ))
            }
            Plan::Local => {
                phases.push(MutationPhase::LocalDirect);
                let workflow = self.local_workflow_id(tenant_id, &event);
                let applied = self.apply_transition(tenant_id, &document, transition);
                let record_failure = |message: String| {
                    self.outcomes.record(
                        OutcomeRecord::failure(
                            tenant_id,
                            event,
                            kind.entity_type(),
                            document.id.as_str(),
                            to_json(&document),
                            message,
                        )
                        .with_workflow(workflow.clone())
                        .with_dispatched(origin.is_callback()),
                    );
                };

                let data = match applied {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        let err = DocumentError::StateChanged {
                            id: document.id.to_string(),
                        };
                        record_failure(err.to_string());
                        return Err(err);
                    }
                    Err(err) => {
                        record_failure(err.to_string());
                        return Err(err.into());
                    }
                };

                self.outcomes.record(
                    OutcomeRecord::success(
                        tenant_id,
                        event,
                        kind.entity_type(),
                        document.id.as_str(),
                        data.clone(),
                    )
                    .with_workflow(workflow.clone())
                    .with_dispatched(origin.is_callback()),
                );
                phases.push(MutationPhase::Logged);
                let side_effects = match transition {
                    Transition::SetStatus(status) => {
                        let mut updated = document.clone();
                        updated.status = status;
                        self.issue_side_effects(&event, &updated)
                    }
                    Transition::Remove | Transition::Tombstone => Vec::new(),
                };
                phases.push(MutationPhase::Responded);
                let mut out = reply(
                    false,
                    Some(format!(
                        "{} {} {}",
                        kind.entity_type(),
                        document.number,
                        past_tense(action)
                    )),
                    data,
                    ExecutionPath::LocalDirect,
                    phases,
                );
                out.side_effects = side_effects;
                Ok(out)
            }
        }
    }

    fn plan_mutation<'a>(
        &self,
        origin: &'a RequestOrigin,
        event: &EventType,
    ) -> Result<Plan<'a>, DocumentError> {
        let RequestOrigin::PrimaryCaller(caller) = origin else {
            return Ok(Plan::Local);
        };
        let route = self.dispatch.route(caller.tenant_id(), event)?;
        let path = plan_primary_mutation(
            route,
            &self.fallback,
            self.dispatch.core().runner_configured(),
        )?;
        Ok(match path {
            ExecutionPath::Delegated(route) => Plan::Delegate { caller, route },
            ExecutionPath::LocalDirect => Plan::Local,
        })
    }

    fn plan_read<'a>(
        &self,
        origin: &'a RequestOrigin,
        event: &EventType,
    ) -> Result<Plan<'a>, DocumentError> {
        let RequestOrigin::PrimaryCaller(caller) = origin else {
            return Ok(Plan::Local);
        };
        let route = self.dispatch.route(caller.tenant_id(), event)?;
        Ok(
            match plan_primary_read(route, self.dispatch.core().runner_configured())? {
                ExecutionPath::Delegated(route) => Plan::Delegate { caller, route },
                ExecutionPath::LocalDirect => Plan::Local,
            },
        )
    }

    /// Waits for the runner. Persistence and the success entry come later,
    /// from the runner's callback; only a failed attempt is logged here.
    fn delegate_mutation(
        &self,
        caller: &CallerSession,
        route: ResolvedRoute,
        kind: DocumentKind,
        entity_id: &str,
        payload: &Value,
        phases: &mut Vec<MutationPhase>,
    ) -> Result<(ResolvedRoute, Value), DocumentError> {
        phases.push(MutationPhase::Delegated);
        let event = route.event;
        let workflow = route.runner_workflow_id.clone();
        match self.dispatch.call_route::<Value>(caller, route, payload) {
            Ok(dispatched) => {
                phases.push(MutationPhase::Responded);
                Ok((dispatched.route, dispatched.data))
            }
            Err(err) => {
                if err.reached_runner() {
                    self.outcomes.record(
                        OutcomeRecord::failure(
                            caller.tenant_id(),
                            event,
                            kind.entity_type(),
                            entity_id,
                            payload.clone(),
                            err.to_string(),
                        )
                        .dispatched(workflow),
                    );
                    phases.push(MutationPhase::Logged);
                }
                Err(err.into())
            }
        }
    }

    /// `Ok(None)` means the row no longer matched what was planned against.
    fn apply_transition(
        &self,
        tenant_id: &TenantId,
        document: &DomainDocument,
        transition: Transition,
    ) -> Result<Option<Value>, crate::store::StoreError> {
        match transition {
            Transition::SetStatus(next) => {
                if !self
                    .store
                    .update_document_status(tenant_id, &document.id, document.status, next)?
                {
                    return Ok(None);
                }
                let refreshed = self
                    .store
                    .get_document(tenant_id, document.kind, &document.id)?;
                Ok(refreshed.map(|doc| to_json(&doc)))
            }
            Transition::Remove => Ok(self
                .store
                .remove_draft_document(tenant_id, &document.id)?
                .then(|| deletion_body(document, "removed"))),
            Transition::Tombstone => Ok(self
                .store
                .tombstone_document(tenant_id, &document.id)?
                .then(|| deletion_body(document, "tombstoned"))),
        }
    }

    fn load_live(
        &self,
        tenant_id: &TenantId,
        kind: DocumentKind,
        id: &DocumentId,
    ) -> Result<DomainDocument, DocumentError> {
        self.store
            .get_document(tenant_id, kind, id)?
            .filter(|document| document.deleted_at.is_none())
            .ok_or_else(|| DocumentError::NotFound {
                entity: kind.entity_type(),
                id: id.to_string(),
            })
    }

    /// Best effort: the workflow id of a tenant delegation for `event`, for
    /// the audit entry of a locally executed mutation.
    fn local_workflow_id(&self, tenant_id: &TenantId, event: &EventType) -> Option<String> {
        self.dispatch
            .route(tenant_id, event)
            .ok()
            .and_then(|route| route.runner_workflow_id)
    }

    fn issue_side_effects(&self, event: &EventType, document: &DomainDocument) -> Vec<Submission> {
        let mut out = Vec::new();
        for effect in side_effects_for(event) {
            let trigger = match SideEffectTrigger::new(*event, *effect) {
                Ok(trigger) => trigger,
                Err(err) => {
                    self.ops.warn("side_effect.trigger_refused", &err.to_string());
                    continue;
                }
            };
            let submission = self.dispatch.fire_and_forget(
                trigger,
                &document.tenant_id,
                EntityRef {
                    entity_type: document.kind.entity_type().to_string(),
                    entity_id: document.id.to_string(),
                },
                to_json(document),
            );
            out.push(submission);
        }
        out
    }
}

/// Auxiliary workflows that follow a committed local mutation.
pub fn side_effects_for(event: &EventType) -> &'static [SideEffectKind] {
    match event {
        EventType::Document {
            kind: DocumentKind::Invoice,
            action: DocumentAction::Create,
        } => &[SideEffectKind::InvoiceRenderPdf],
        EventType::Document {
            kind: DocumentKind::Invoice,
            action: DocumentAction::Validate | DocumentAction::Settle,
        } => &[SideEffectKind::AccountingAutoPost],
        _ => &[],
    }
}

fn authorize(origin: &RequestOrigin, action: DocumentAction) -> Result<(), DocumentError> {
    match origin {
        RequestOrigin::PrimaryCaller(session)
            if action.is_mutation() && !session.role().can_mutate() =>
        {
            Err(DocumentError::Forbidden {
                role: session.role().as_str(),
                action: action.as_str(),
            })
        }
        _ => Ok(()),
    }
}

fn parse_document_id(kind: DocumentKind, raw: &str) -> Result<DocumentId, DocumentError> {
    DocumentId::parse(raw).map_err(|_| DocumentError::NotFound {
        entity: kind.entity_type(),
        id: raw.to_string(),
    })
}

fn past_tense(action: DocumentAction) -> &'static str {
    match action {
        DocumentAction::Validate => "validated",
        DocumentAction::Settle => "settled",
        DocumentAction::Cancel => "cancelled",
        DocumentAction::Delete => "deleted",
        DocumentAction::Create => "created",
        DocumentAction::List | DocumentAction::Get => "read",
    }
}

fn deletion_body(document: &DomainDocument, mode: &str) -> Value {
    json!({
        "id": document.id.as_str(),
        "number": document.number,
        "deleted": mode,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn reply(
    created: bool,
    message: Option<String>,
    data: Value,
    path: ExecutionPath,
    phases: Vec<MutationPhase>,
) -> ServiceReply {
    ServiceReply {
        created,
        message,
        data,
        path,
        phases,
        side_effects: Vec::new(),
    }
}
