use super::RuntimeError;
use crate::dispatch::{EventType, ResolvedRoute};
use crate::outcome::{OutcomeLog, OutcomeRecord};
use crate::shared::{OpsLog, TenantId};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_millis(10);

/// A side-effect delivery, already routed.
#[derive(Debug, Clone, PartialEq)]
pub struct SideEffectJob {
    pub tenant_id: TenantId,
    pub event: EventType,
    pub triggered_by: EventType,
    pub entity_type: String,
    pub entity_id: String,
    pub route: ResolvedRoute,
    pub payload: Value,
}

/// Runs one job to completion on a worker thread.
pub trait SideEffectHandler: Send + Sync {
    fn run(&self, job: &SideEffectJob) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The route had no tenant delegation, so nothing is sent.
    Skipped { reason: String },
    Rejected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideEffectQueueConfig {
    pub workers: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub skipped: u64,
}

impl CounterSnapshot {
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.succeeded.saturating_add(self.failed))
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            submitted: self.submitted.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug)]
struct SideEffectReport {
    worker: usize,
    job: SideEffectJob,
    result: Result<(), String>,
}

struct Threads {
    workers: Vec<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

struct QueueInner {
    sender: Mutex<Option<SyncSender<SideEffectJob>>>,
    threads: Mutex<Threads>,
    counters: Arc<Counters>,
    outcomes: OutcomeLog,
    ops: OpsLog,
}

/// Bounded queue of side-effect jobs drained by a fixed worker pool.
///
/// Submitters never wait on delivery. Every result flows to a supervisor
/// thread, which keeps the counters and records failures in the outcome
/// log and the operational log.
#[derive(Clone)]
pub struct SideEffectQueue {
    inner: Arc<QueueInner>,
}

impl SideEffectQueue {
    pub fn start(
        config: SideEffectQueueConfig,
        handler: Arc<dyn SideEffectHandler>,
        outcomes: OutcomeLog,
        ops: OpsLog,
    ) -> Result<Self, RuntimeError> {
        let (job_tx, job_rx) = mpsc::sync_channel::<SideEffectJob>(config.capacity.max(1));
        let (report_tx, report_rx) = mpsc::channel::<SideEffectReport>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::new();
        for worker in 0..config.workers.max(1) {
            let jobs = Arc::clone(&job_rx);
            let reports = report_tx.clone();
            let handler = Arc::clone(&handler);
            let handle = thread::Builder::new()
                .name(format!("side-effect-{worker}"))
                .spawn(move || run_worker(worker, jobs, handler, reports))
                .map_err(|source| RuntimeError::Spawn {
                    name: format!("side-effect-{worker}"),
                    source,
                })?;
            workers.push(handle);
        }
        drop(report_tx);

        let supervisor = {
            let counters = Arc::clone(&counters);
            let outcomes = outcomes.clone();
            let ops = ops.clone();
            thread::Builder::new()
                .name("side-effect-supervisor".to_string())
                .spawn(move || run_supervisor(report_rx, counters, outcomes, ops))
                .map_err(|source| RuntimeError::Spawn {
                    name: "side-effect-supervisor".to_string(),
                    source,
                })?
        };

        ops.info(
            "side_effect.queue.started",
            &format!(
                "workers={} capacity={}",
                config.workers.max(1),
                config.capacity.max(1)
            ),
        );

        Ok(Self {
            inner: Arc::new(QueueInner {
                sender: Mutex::new(Some(job_tx)),
                threads: Mutex::new(Threads {
                    workers,
                    supervisor: Some(supervisor),
                }),
                counters,
                outcomes,
                ops,
            }),
        })
    }

    pub fn submit(&self, job: SideEffectJob) -> Submission {
        let sender = match self.inner.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let Some(sender) = sender else {
            return self.reject(job, "side-effect queue is shut down");
        };

        // Count before sending so a fast worker cannot finish first.
        self.inner.counters.submitted.fetch_add(1, Ordering::SeqCst);
        match sender.try_send(job) {
            Ok(()) => Submission::Queued,
            Err(TrySendError::Full(job)) => {
                self.inner.counters.submitted.fetch_sub(1, Ordering::SeqCst);
                self.reject(job, "side-effect queue is full")
            }
            Err(TrySendError::Disconnected(job)) => {
                self.inner.counters.submitted.fetch_sub(1, Ordering::SeqCst);
                self.reject(job, "side-effect queue is shut down")
            }
        }
    }

    pub(crate) fn note_skipped(&self) {
        self.inner.counters.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn reject(&self, job: SideEffectJob, reason: &str) -> Submission {
        self.inner.counters.rejected.fetch_add(1, Ordering::SeqCst);
        self.inner.ops.append(
            "warn",
            "side_effect.rejected",
            reason,
            &job_fields(&job),
        );
        self.inner.outcomes.record(failure_record(&job, reason));
        Submission::Rejected {
            reason: reason.to_string(),
        }
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.inner.counters.snapshot()
    }

    /// Polls until every accepted job has been reported, or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.counters().in_flight() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    /// Closes the queue, lets the workers drain what was accepted and joins
    /// every thread. Later submissions are rejected.
    pub fn shutdown(&self) {
        let sender = match self.inner.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let (workers, supervisor) = match self.inner.threads.lock() {
            Ok(mut threads) => (
                std::mem::take(&mut threads.workers),
                threads.supervisor.take(),
            ),
            Err(poisoned) => {
                let mut threads = poisoned.into_inner();
                (
                    std::mem::take(&mut threads.workers),
                    threads.supervisor.take(),
                )
            }
        };
        for handle in workers {
            let _ = handle.join();
        }
        if let Some(handle) = supervisor {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    worker: usize,
    jobs: Arc<Mutex<Receiver<SideEffectJob>>>,
    handler: Arc<dyn SideEffectHandler>,
    reports: Sender<SideEffectReport>,
) {
    loop {
        let next = match jobs.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };
        let Ok(job) = next else {
            return;
        };
        let result = handler.run(&job);
        if reports
            .send(SideEffectReport {
                worker,
                job,
                result,
            })
            .is_err()
        {
            return;
        }
    }
}

fn run_supervisor(
    reports: Receiver<SideEffectReport>,
    counters: Arc<Counters>,
    outcomes: OutcomeLog,
    ops: OpsLog,
) {
    while let Ok(report) = reports.recv() {
        let mut fields = job_fields(&report.job);
        fields.push(("worker", json!(report.worker)));
        match report.result {
            Ok(()) => {
                ops.append(
                    "info",
                    "side_effect.delivered",
                    report.job.route.webhook_path,
                    &fields,
                );
                counters.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            Err(message) => {
                ops.append("error", "side_effect.failed", &message, &fields);
                outcomes.record(failure_record(&report.job, &message));
                counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

fn failure_record(job: &SideEffectJob, message: &str) -> OutcomeRecord {
    OutcomeRecord::failure(
        &job.tenant_id,
        job.event,
        &job.entity_type,
        &job.entity_id,
        job.payload.clone(),
        message,
    )
    .dispatched(job.route.runner_workflow_id.clone())
}

fn job_fields(job: &SideEffectJob) -> Vec<(&'static str, Value)> {
    vec![
        ("tenantId", json!(job.tenant_id.as_str())),
        ("eventType", json!(job.event.as_string())),
        ("triggeredBy", json!(job.triggered_by.as_string())),
        ("entityId", json!(job.entity_id)),
    ]
}
