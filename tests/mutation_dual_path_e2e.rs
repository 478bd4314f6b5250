use relaydesk::api::ApiRequest;
use relaydesk::app::AppContext;
use relaydesk::config::{SessionConfig, Settings};
use relaydesk::dispatch::{RunnerTransport, TransportError, TransportResponse};
use relaydesk::documents::DocumentKind;
use relaydesk::origin::RUNNER_SECRET_HEADER;
use relaydesk::shared::logging::dispatch_log_path;
use relaydesk::shared::{current_year, TenantId};
use relaydesk::store::{Outcome, OutcomeFilter};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const TENANT: &str = "5c5c5c5c-5c5c-4c5c-8c5c-5c5c5c5c5c5c";
const ADMIN: &str = "admin-token";
const MEMBER: &str = "member-token";
const SECRET: &str = "runner-shared-secret";

type Reply = Box<dyn Fn(&str) -> Result<TransportResponse, TransportError> + Send + Sync>;

/// In-memory runner: records every outbound call and answers from `reply`.
struct RecordingTransport {
    calls: Mutex<Vec<(String, Value)>>,
    reply: Reply,
}

impl RecordingTransport {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply,
        })
    }

    fn answering(status: u16, body: &str) -> Arc<Self> {
        let body = body.to_string();
        Self::new(Box::new(move |_| {
            Ok(TransportResponse {
                status,
                body: body.clone(),
            })
        }))
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().expect("calls").clone()
    }
}

impl RunnerTransport for RecordingTransport {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls
            .lock()
            .expect("calls")
            .push((url.to_string(), body.clone()));
        (self.reply)(url)
    }

    fn get(&self, url: &str, _timeout: Duration) -> Result<TransportResponse, TransportError> {
        self.calls
            .lock()
            .expect("calls")
            .push((url.to_string(), Value::Null));
        (self.reply)(url)
    }
}

fn tenant() -> TenantId {
    TenantId::parse(TENANT).expect("tenant")
}

fn settings(dir: &TempDir) -> Settings {
    let mut settings = Settings {
        state_root: Some(dir.path().to_path_buf()),
        ..Settings::default()
    };
    settings.runner.base_url = Some("http://runner.test".to_string());
    settings.runner.callback_secret = Some(SECRET.to_string());
    for (token, role) in [(ADMIN, "admin"), (MEMBER, "member")] {
        settings.sessions.insert(
            token.to_string(),
            SessionConfig {
                tenant_id: TENANT.to_string(),
                user_id: format!("{role}-user"),
                role: role.to_string(),
            },
        );
    }
    settings
}

fn open(dir: &TempDir, transport: Arc<RecordingTransport>) -> AppContext {
    AppContext::with_transport(settings(dir), transport).expect("context")
}

fn create_credit_note() -> ApiRequest {
    ApiRequest::new("POST", "/api/credit-notes")
        .with_bearer(ADMIN)
        .with_body(json!({"clientId": "client-7", "amountExclTax": 120.0}))
}

#[test]
fn local_create_without_delegation_returns_201_and_logs_one_success() {
    let dir = tempdir().expect("tempdir");
    let transport = RecordingTransport::answering(200, "{}");
    let context = open(&dir, transport.clone());

    let response = context.api().handle(&create_credit_note());
    assert_eq!(response.status, 201, "{}", response.body);
    assert_eq!(response.body["success"], json!(true));
    let data = &response.body["data"];
    assert_eq!(
        data["number"],
        json!(format!("AVO-{}-000001", current_year()))
    );
    assert_eq!(data["status"], json!("draft"));
    assert_eq!(data["amountInclTax"], json!(144.0));

    let entity_id = data["id"].as_str().expect("id");
    let entries = context
        .store()
        .list_outcomes(&tenant(), &OutcomeFilter::entity(entity_id))
        .expect("outcomes");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, Outcome::Success);
    assert_eq!(entries[0].event_type, "credit_note_create");
    assert!(!entries[0].dispatched);
    assert!(transport.calls().is_empty());

    let ops = std::fs::read_to_string(dispatch_log_path(dir.path())).expect("ops log");
    let served = ops
        .lines()
        .find(|line| line.contains("api.request.completed"))
        .expect("request logged");
    assert!(served.contains(r#""executionPath":"local_direct""#), "{served}");
    context.shutdown();
}

#[test]
fn delegated_create_with_a_failing_runner_returns_502_and_persists_nothing() {
    let dir = tempdir().expect("tempdir");
    let transport = RecordingTransport::answering(502, r#"{"error":"bad gateway"}"#);
    let context = open(&dir, transport.clone());
    context
        .store()
        .activate_delegation(&tenant(), "credit_note_create", "avoir_create")
        .expect("delegate");

    let response = context.api().handle(&create_credit_note());
    assert_eq!(response.status, 502, "{}", response.body);
    assert_eq!(response.body["success"], json!(false));
    assert_eq!(response.body["kind"], json!("upstream"));
    assert_eq!(
        context
            .store()
            .count_documents(&tenant(), Some(DocumentKind::CreditNote))
            .expect("count"),
        0
    );

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "http://runner.test/webhook/avoir-created");
    assert_eq!(calls[0].1["client_id"], json!("client-7"));

    let entries = context
        .store()
        .list_outcomes(&tenant(), &OutcomeFilter::default())
        .expect("outcomes");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, Outcome::Error);
    assert!(entries[0].dispatched);
    assert_eq!(entries[0].runner_workflow_id.as_deref(), Some("avoir_create"));
    assert_eq!(
        context
            .store()
            .list_notifications(&tenant(), false)
            .expect("notifications")
            .len(),
        1
    );
    context.shutdown();
}

#[test]
fn a_runner_timeout_is_an_upstream_failure() {
    let dir = tempdir().expect("tempdir");
    let transport =
        RecordingTransport::new(Box::new(|_| Err(TransportError::Timeout { timeout_secs: 30 })));
    let context = open(&dir, transport);
    context
        .store()
        .activate_delegation(&tenant(), "credit_note_create", "avoir_create")
        .expect("delegate");

    let response = context.api().handle(&create_credit_note());
    assert_eq!(response.status, 502);
    assert!(response.body["message"]
        .as_str()
        .expect("message")
        .contains("timed out"));
    assert_eq!(
        context
            .store()
            .count_documents(&tenant(), None)
            .expect("count"),
        0
    );
    context.shutdown();
}

#[test]
fn delegated_create_returns_the_runner_reply_without_local_writes() {
    let dir = tempdir().expect("tempdir");
    let transport =
        RecordingTransport::answering(200, r#"{"document_id":"runner-side","queued_at":"now"}"#);
    let context = open(&dir, transport.clone());
    context
        .store()
        .activate_delegation(&tenant(), "credit_note_create", "avoir_create")
        .expect("delegate");

    let response = context.api().handle(&create_credit_note());
    assert_eq!(response.status, 201, "{}", response.body);
    assert_eq!(
        response.body["data"],
        json!({"documentId": "runner-side", "queuedAt": "now"})
    );
    assert_eq!(
        context
            .store()
            .count_documents(&tenant(), None)
            .expect("count"),
        0
    );
    assert!(context
        .store()
        .list_outcomes(&tenant(), &OutcomeFilter::default())
        .expect("outcomes")
        .is_empty());
    assert_eq!(transport.calls().len(), 1);
    context.shutdown();
}

#[test]
fn runner_callbacks_never_dispatch_outbound() {
    let dir = tempdir().expect("tempdir");
    let transport = RecordingTransport::answering(200, "{}");
    let context = open(&dir, transport.clone());
    for event in ["invoice_create", "invoice_validate"] {
        context
            .store()
            .activate_delegation(&tenant(), event, event)
            .expect("delegate");
    }

    let callback = |method: &str, path: &str| {
        ApiRequest::new(method, path)
            .with_header(RUNNER_SECRET_HEADER, SECRET)
            .with_body(json!({
                "tenant_id": TENANT,
                "client_id": "client-9",
                "amount_excl_tax": 80,
                "tax_rate": 5.5,
            }))
    };

    let created = context.api().handle(&callback("POST", "/api/invoices"));
    assert_eq!(created.status, 201, "{}", created.body);
    assert_eq!(created.body["data"]["clientId"], json!("client-9"));
    assert_eq!(created.body["data"]["amountInclTax"], json!(84.4));
    let id = created.body["data"]["id"].as_str().expect("id").to_string();

    let validated = context
        .api()
        .handle(&callback("PUT", &format!("/api/invoices/{id}/validate")));
    assert_eq!(validated.status, 200, "{}", validated.body);
    assert_eq!(validated.body["data"]["status"], json!("validated"));

    assert!(context
        .dispatch()
        .side_effects()
        .wait_idle(Duration::from_secs(5)));
    assert!(
        transport.calls().is_empty(),
        "callback dispatched: {:?}",
        transport.calls()
    );

    let entries = context
        .store()
        .list_outcomes(&tenant(), &OutcomeFilter::entity(&id))
        .expect("outcomes");
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .all(|entry| entry.outcome == Outcome::Success && entry.dispatched));
    context.shutdown();
}

#[test]
fn a_callback_still_issues_delegated_side_effects() {
    let dir = tempdir().expect("tempdir");
    let transport = RecordingTransport::answering(200, "{}");
    let context = open(&dir, transport.clone());
    for (event, workflow) in [
        ("invoice_create", "invoice_create"),
        ("invoice_render_pdf", "invoice_generate_pdf"),
    ] {
        context
            .store()
            .activate_delegation(&tenant(), event, workflow)
            .expect("delegate");
    }

    let created = context.api().handle(
        &ApiRequest::new("POST", "/api/invoices")
            .with_header(RUNNER_SECRET_HEADER, SECRET)
            .with_body(json!({
                "tenant_id": TENANT,
                "client_id": "client-3",
                "amount_excl_tax": 40,
            })),
    );
    assert_eq!(created.status, 201, "{}", created.body);
    assert!(context
        .dispatch()
        .side_effects()
        .wait_idle(Duration::from_secs(5)));

    let calls = transport.calls();
    assert_eq!(calls.len(), 1, "{calls:?}");
    assert_eq!(calls[0].0, "http://runner.test/webhook/invoice-generate-pdf");
    assert_eq!(calls[0].1["event"], json!("invoice_render_pdf"));
    assert!(calls.iter().all(|(url, _)| !url.ends_with("/invoice-created")));
    context.shutdown();
}

fn install_trigger(dir: &TempDir, sql: &str) {
    let connection =
        rusqlite::Connection::open(dir.path().join("relaydesk.db")).expect("open store");
    connection.execute_batch(sql).expect("install trigger");
}

fn failure_count(context: &AppContext) -> (usize, usize) {
    let errors = context
        .store()
        .list_outcomes(
            &tenant(),
            &OutcomeFilter {
                outcome: Some(Outcome::Error),
                ..OutcomeFilter::default()
            },
        )
        .expect("outcomes");
    let notifications = context
        .store()
        .list_notifications(&tenant(), false)
        .expect("notifications");
    (errors.len(), notifications.len())
}

#[test]
fn a_local_create_the_store_rejects_is_logged_and_notified_once() {
    let dir = tempdir().expect("tempdir");
    let transport = RecordingTransport::answering(200, "{}");
    let context = open(&dir, transport.clone());
    install_trigger(
        &dir,
        "CREATE TRIGGER documents_frozen BEFORE INSERT ON documents
         BEGIN SELECT RAISE(ABORT, 'documents are frozen'); END;",
    );

    let response = context.api().handle(&create_credit_note());
    assert_eq!(response.status, 500, "{}", response.body);
    assert_eq!(response.body["kind"], json!("internal"));
    assert_eq!(failure_count(&context), (1, 1));

    let entries = context
        .store()
        .list_outcomes(&tenant(), &OutcomeFilter::default())
        .expect("outcomes");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "credit_note_create");
    assert!(entries[0]
        .error_message
        .as_deref()
        .expect("message")
        .contains("documents are frozen"));
    assert!(transport.calls().is_empty());
    context.shutdown();
}

#[test]
fn a_local_transition_the_store_rejects_is_logged_and_notified_once() {
    let dir = tempdir().expect("tempdir");
    let context = open(&dir, RecordingTransport::answering(200, "{}"));
    let created = context.api().handle(&create_credit_note());
    assert_eq!(created.status, 201, "{}", created.body);
    let id = created.body["data"]["id"].as_str().expect("id").to_string();
    install_trigger(
        &dir,
        "CREATE TRIGGER documents_locked BEFORE UPDATE ON documents
         BEGIN SELECT RAISE(ABORT, 'documents are locked'); END;",
    );

    let response = context.api().handle(
        &ApiRequest::new("PUT", &format!("/api/credit-notes/{id}/validate")).with_bearer(ADMIN),
    );
    assert_eq!(response.status, 500, "{}", response.body);
    assert_eq!(failure_count(&context), (1, 1));

    let entries = context
        .store()
        .list_outcomes(&tenant(), &OutcomeFilter::entity(&id))
        .expect("outcomes");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].outcome, Outcome::Error);
    assert_eq!(entries[1].event_type, "credit_note_validate");
    context.shutdown();
}

#[test]
fn losing_the_status_race_is_a_state_error_logged_once() {
    let dir = tempdir().expect("tempdir");
    let context = open(&dir, RecordingTransport::answering(200, "{}"));
    let created = context.api().handle(&create_credit_note());
    assert_eq!(created.status, 201, "{}", created.body);
    let id = created.body["data"]["id"].as_str().expect("id").to_string();
    // Swallows the status write, as if another request changed the row first.
    install_trigger(
        &dir,
        "CREATE TRIGGER documents_contended BEFORE UPDATE ON documents
         BEGIN SELECT RAISE(IGNORE); END;",
    );

    let response = context.api().handle(
        &ApiRequest::new("PUT", &format!("/api/credit-notes/{id}/validate")).with_bearer(ADMIN),
    );
    assert_eq!(response.status, 400, "{}", response.body);
    assert_eq!(response.body["kind"], json!("state"));
    assert_eq!(failure_count(&context), (1, 1));

    let document = context
        .api()
        .handle(&ApiRequest::new("GET", &format!("/api/credit-notes/{id}")).with_bearer(ADMIN));
    assert_eq!(document.body["data"]["status"], json!("draft"));
    context.shutdown();
}

#[test]
fn a_failing_side_effect_does_not_change_the_primary_response() {
    let dir = tempdir().expect("tempdir");
    let transport = RecordingTransport::new(Box::new(|url| {
        if url.ends_with("/invoice-generate-pdf") {
            Err(TransportError::Io("connection reset by peer".to_string()))
        } else {
            Ok(TransportResponse {
                status: 200,
                body: "{}".to_string(),
            })
        }
    }));
    let context = open(&dir, transport.clone());
    let create = || {
        ApiRequest::new("POST", "/api/invoices")
            .with_bearer(ADMIN)
            .with_body(json!({"clientId": "client-1", "amountExclTax": 10.0}))
    };

    let before = context.api().handle(&create());
    context
        .store()
        .activate_delegation(&tenant(), "invoice_render_pdf", "invoice_generate_pdf")
        .expect("delegate");
    let after = context.api().handle(&create());
    assert!(context
        .dispatch()
        .side_effects()
        .wait_idle(Duration::from_secs(5)));

    assert_eq!(before.status, 201);
    assert_eq!(after.status, before.status);
    assert_eq!(after.body["success"], before.body["success"]);
    let keys = |body: &Value| {
        body.as_object()
            .expect("object")
            .keys()
            .cloned()
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(&after.body), keys(&before.body));
    assert_eq!(keys(&after.body["data"]), keys(&before.body["data"]));
    assert_eq!(
        after.body["data"]["number"],
        json!(format!("INV-{}-000002", current_year()))
    );

    let after_id = after.body["data"]["id"].as_str().expect("id");
    let entries = context
        .store()
        .list_outcomes(&tenant(), &OutcomeFilter::entity(after_id))
        .expect("outcomes");
    let failures: Vec<_> = entries
        .iter()
        .filter(|entry| entry.outcome == Outcome::Error)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].event_type, "invoice_render_pdf");
    assert!(failures[0]
        .error_message
        .as_deref()
        .expect("message")
        .contains("connection reset"));
    assert_eq!(
        entries
            .iter()
            .filter(|entry| entry.outcome == Outcome::Success)
            .count(),
        1
    );
    assert_eq!(transport.calls().len(), 1);
    context.shutdown();
}

#[test]
fn authentication_and_authorization_short_circuit_before_dispatch() {
    let dir = tempdir().expect("tempdir");
    let transport = RecordingTransport::answering(200, "{}");
    let context = open(&dir, transport.clone());
    context
        .store()
        .activate_delegation(&tenant(), "credit_note_create", "avoir_create")
        .expect("delegate");
    let body = json!({"clientId": "c", "amountExclTax": 1.0});

    let anonymous = context
        .api()
        .handle(&ApiRequest::new("POST", "/api/credit-notes").with_body(body.clone()));
    assert_eq!(anonymous.status, 401);
    assert_eq!(anonymous.body["kind"], json!("authentication"));

    let member = context.api().handle(
        &ApiRequest::new("POST", "/api/credit-notes")
            .with_bearer(MEMBER)
            .with_body(body.clone()),
    );
    assert_eq!(member.status, 403);

    let forged = context.api().handle(
        &ApiRequest::new("POST", "/api/credit-notes")
            .with_header(RUNNER_SECRET_HEADER, "guess")
            .with_body(json!({"tenantId": TENANT, "clientId": "c", "amountExclTax": 1.0})),
    );
    assert_eq!(forged.status, 401);

    let invalid = context.api().handle(
        &ApiRequest::new("POST", "/api/credit-notes")
            .with_bearer(ADMIN)
            .with_body(json!({"clientId": "", "amountExclTax": 1.0})),
    );
    assert_eq!(invalid.status, 400);
    assert_eq!(invalid.body["kind"], json!("validation"));

    assert!(transport.calls().is_empty());
    context.shutdown();
}

#[test]
fn lifecycle_rules_apply_on_the_local_path() {
    let dir = tempdir().expect("tempdir");
    let context = open(&dir, RecordingTransport::answering(200, "{}"));
    let api = context.api();

    let created = api.handle(
        &ApiRequest::new("POST", "/api/quotes")
            .with_bearer(ADMIN)
            .with_body(json!({"clientId": "c", "amountExclTax": 5.0})),
    );
    assert_eq!(created.status, 201);
    let id = created.body["data"]["id"].as_str().expect("id").to_string();

    let settle_draft =
        api.handle(&ApiRequest::new("PUT", &format!("/api/quotes/{id}/settle")).with_bearer(ADMIN));
    assert_eq!(settle_draft.status, 400);
    assert_eq!(settle_draft.body["kind"], json!("state"));

    let validated = api
        .handle(&ApiRequest::new("PUT", &format!("/api/quotes/{id}/validate")).with_bearer(ADMIN));
    assert_eq!(validated.status, 200);

    let deleted =
        api.handle(&ApiRequest::new("DELETE", &format!("/api/quotes/{id}")).with_bearer(ADMIN));
    assert_eq!(deleted.status, 200);
    assert_eq!(deleted.body["data"]["deleted"], json!("tombstoned"));

    let gone = api.handle(&ApiRequest::new("GET", &format!("/api/quotes/{id}")).with_bearer(MEMBER));
    assert_eq!(gone.status, 404);

    let listed = api.handle(&ApiRequest::new("GET", "/api/quotes?limit=500").with_bearer(MEMBER));
    assert_eq!(listed.status, 200);
    assert_eq!(listed.body["data"]["total"], json!(0));
    assert_eq!(listed.body["data"]["limit"], json!(100));

    let unknown = api.handle(&ApiRequest::new("GET", "/api/receipts").with_bearer(ADMIN));
    assert_eq!(unknown.status, 404);

    // create, validate and delete; the refused settle never reached a path.
    let entries = context
        .store()
        .list_outcomes(&tenant(), &OutcomeFilter::entity(&id))
        .expect("outcomes");
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|entry| entry.outcome == Outcome::Success));
    context.shutdown();
}

#[test]
fn disabling_local_fallback_sends_alias_routes_to_the_runner() {
    let dir = tempdir().expect("tempdir");
    let transport = RecordingTransport::answering(200, r#"{"accepted":true}"#);
    let mut settings = settings(&dir);
    settings.local_fallback.default = false;
    let context = AppContext::with_transport(settings, transport.clone()).expect("context");

    let response = context.api().handle(
        &ApiRequest::new("POST", "/api/purchase-orders")
            .with_bearer(ADMIN)
            .with_body(json!({"clientId": "c", "amountExclTax": 3.0})),
    );
    assert_eq!(response.status, 201, "{}", response.body);
    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "http://runner.test/webhook/bdc-created");
    context.shutdown();
}

#[test]
fn a_missing_runner_url_is_a_configuration_error() {
    let dir = tempdir().expect("tempdir");
    let mut settings = settings(&dir);
    settings.runner.base_url = None;
    let context = AppContext::with_transport(settings, RecordingTransport::answering(200, "{}"))
        .expect("context");
    context
        .store()
        .activate_delegation(&tenant(), "credit_note_create", "avoir_create")
        .expect("delegate");

    let response = context.api().handle(&create_credit_note());
    assert_eq!(response.status, 500);
    assert_eq!(response.body["kind"], json!("configuration"));
    context.shutdown();
}
