use relaydesk::dispatch::{EventType, ResolvedRoute, RouteSource, SideEffectKind};
use relaydesk::documents::{DocumentAction, DocumentKind};
use relaydesk::outcome::{OutcomeLog, OutcomeRecord};
use relaydesk::runtime::{
    SideEffectHandler, SideEffectJob, SideEffectQueue, SideEffectQueueConfig, Submission,
};
use relaydesk::shared::{OpsLog, TenantId};
use relaydesk::store::{Outcome, OutcomeFilter, Store};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const TENANT: &str = "5c5c5c5c-5c5c-4c5c-8c5c-5c5c5c5c5c5c";

fn tenant() -> TenantId {
    TenantId::parse(TENANT).expect("tenant")
}

struct SlowHandler {
    delay: Duration,
    runs: AtomicUsize,
}

impl SideEffectHandler for SlowHandler {
    fn run(&self, job: &SideEffectJob) -> Result<(), String> {
        thread::sleep(self.delay);
        self.runs.fetch_add(1, Ordering::SeqCst);
        if job.entity_id.starts_with("bad-") {
            Err(format!("runner rejected {}", job.entity_id))
        } else {
            Ok(())
        }
    }
}

fn job(entity_id: &str) -> SideEffectJob {
    let event = EventType::SideEffect(SideEffectKind::AccountingInit);
    SideEffectJob {
        tenant_id: tenant(),
        event,
        triggered_by: EventType::document(DocumentKind::Invoice, DocumentAction::Create),
        entity_type: "Invoice".to_string(),
        entity_id: entity_id.to_string(),
        route: ResolvedRoute {
            event,
            webhook_path: "compta-init",
            source: RouteSource::TenantConfig,
            runner_workflow_id: Some("accounting_init".to_string()),
        },
        payload: json!({"invoiceId": entity_id}),
    }
}

fn store_in(dir: &std::path::Path) -> Store {
    let store = Store::open(&dir.join("relaydesk.db")).expect("open");
    store.ensure_schema().expect("schema");
    store
}

#[test]
fn shutdown_drains_accepted_jobs_and_logs_only_failures() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let handler = Arc::new(SlowHandler {
        delay: Duration::from_millis(50),
        runs: AtomicUsize::new(0),
    });
    let queue = SideEffectQueue::start(
        SideEffectQueueConfig {
            workers: 2,
            capacity: 16,
        },
        handler.clone(),
        OutcomeLog::new(store.clone(), OpsLog::disabled()),
        OpsLog::new(dir.path()),
    )
    .expect("start");

    for id in ["inv-1", "inv-2", "bad-3", "inv-4", "bad-5"] {
        assert_eq!(queue.submit(job(id)), Submission::Queued);
    }
    queue.shutdown();

    assert_eq!(handler.runs.load(Ordering::SeqCst), 5);
    let counters = queue.counters();
    assert_eq!(counters.submitted, 5);
    assert_eq!(counters.succeeded, 3);
    assert_eq!(counters.failed, 2);
    assert_eq!(counters.in_flight(), 0);

    let entries = store
        .list_outcomes(&tenant(), &OutcomeFilter::default())
        .expect("outcomes");
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.outcome == Outcome::Error
        && entry.event_type == "accounting_init"
        && entry.dispatched));
    let mut failed: Vec<_> = entries.iter().map(|entry| entry.entity_id.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["bad-3", "bad-5"]);
}

#[test]
fn submissions_after_shutdown_are_rejected_and_recorded() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let queue = SideEffectQueue::start(
        SideEffectQueueConfig {
            workers: 1,
            capacity: 1,
        },
        Arc::new(SlowHandler {
            delay: Duration::ZERO,
            runs: AtomicUsize::new(0),
        }),
        OutcomeLog::new(store.clone(), OpsLog::disabled()),
        OpsLog::disabled(),
    )
    .expect("start");
    queue.shutdown();

    match queue.submit(job("inv-late")) {
        Submission::Rejected { reason } => assert!(reason.contains("shut down"), "{reason}"),
        other => panic!("unexpected submission {other:?}"),
    }
    assert_eq!(queue.counters().rejected, 1);
    assert_eq!(queue.counters().submitted, 0);

    let entries = store
        .list_outcomes(&tenant(), &OutcomeFilter::entity("inv-late"))
        .expect("outcomes");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, Outcome::Error);
    assert_eq!(
        entries[0].runner_workflow_id.as_deref(),
        Some("accounting_init")
    );
    assert_eq!(
        store.list_notifications(&tenant(), true).expect("notes").len(),
        1
    );
}

#[test]
fn outcome_filters_and_notifications_are_tenant_scoped() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let log = OutcomeLog::new(store.clone(), OpsLog::disabled());
    let other = TenantId::parse("6d6d6d6d-6d6d-4d6d-8d6d-6d6d6d6d6d6d").expect("tenant");
    let create = EventType::document(DocumentKind::Invoice, DocumentAction::Create);
    let validate = EventType::document(DocumentKind::Invoice, DocumentAction::Validate);

    log.record(OutcomeRecord::success(&tenant(), create, "Invoice", "i-1", json!({})));
    log.record(
        OutcomeRecord::failure(&tenant(), validate, "Invoice", "i-1", json!({}), "HTTP 502")
            .dispatched(Some("invoice_validate".to_string())),
    );
    log.record(OutcomeRecord::success(&other, create, "Invoice", "i-9", json!({})));

    let all = store
        .list_outcomes(&tenant(), &OutcomeFilter::default())
        .expect("all");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].event_type, "invoice_create");
    assert!(!all[0].dispatched);

    let errors = store
        .list_outcomes(
            &tenant(),
            &OutcomeFilter {
                outcome: Some(Outcome::Error),
                ..OutcomeFilter::default()
            },
        )
        .expect("errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_message.as_deref(), Some("HTTP 502"));

    let by_event = store
        .list_outcomes(
            &tenant(),
            &OutcomeFilter {
                event_type: Some("invoice_create".to_string()),
                ..OutcomeFilter::default()
            },
        )
        .expect("by event");
    assert_eq!(by_event.len(), 1);

    let unread = store.list_notifications(&tenant(), true).expect("unread");
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].kind, "invoice_validate_error");
    assert!(store.list_notifications(&other, false).expect("other").is_empty());

    // Another tenant cannot acknowledge it.
    assert!(!store
        .mark_notification_read(&other, &unread[0].notification_id)
        .expect("mark other"));
    assert!(store
        .mark_notification_read(&tenant(), &unread[0].notification_id)
        .expect("mark"));
    assert!(store.list_notifications(&tenant(), true).expect("unread").is_empty());
}
