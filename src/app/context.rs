use crate::api::Api;
use crate::config::{ConfigError, Settings};
use crate::dispatch::{DispatchClient, DispatchCore, RoutingResolver, RunnerTransport, UreqTransport};
use crate::documents::DocumentService;
use crate::origin::{OriginGuard, StaticSessions};
use crate::outcome::OutcomeLog;
use crate::runtime::{RuntimeError, SideEffectQueueConfig};
use crate::shared::OpsLog;
use crate::store::{Store, StoreError};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("invalid session configuration: {0}")]
    Sessions(String),
}

/// Everything one process needs to serve requests, built from an explicit
/// [`Settings`] value.
pub struct AppContext {
    settings: Settings,
    state_root: PathBuf,
    store: Store,
    ops: OpsLog,
    dispatch: DispatchClient,
    api: Api,
}

impl AppContext {
    pub fn open(settings: Settings) -> Result<Self, ContextError> {
        Self::with_transport(settings, Arc::new(UreqTransport))
    }

    /// Like [`open`](Self::open) with a caller-supplied runner transport.
    pub fn with_transport(
        settings: Settings,
        transport: Arc<dyn RunnerTransport>,
    ) -> Result<Self, ContextError> {
        let state_root = settings.resolve_state_root()?;
        let store = Store::open(&settings.resolve_store_path()?)?;
        store.ensure_schema()?;
        let ops = OpsLog::new(&state_root);

        let resolver = RoutingResolver::new(Arc::new(store.clone()), ops.clone());
        let core = Arc::new(DispatchCore::new(
            settings.runner_base_url(),
            settings.runner.timeout(),
            transport,
            resolver,
            ops.clone(),
        ));
        let outcomes = OutcomeLog::new(store.clone(), ops.clone());
        let dispatch = DispatchClient::start(
            core,
            SideEffectQueueConfig {
                workers: settings.side_effects.workers,
                capacity: settings.side_effects.queue_capacity,
            },
            outcomes.clone(),
            ops.clone(),
        )?;

        let service = DocumentService::new(
            store.clone(),
            dispatch.clone(),
            outcomes,
            settings.local_fallback.clone(),
            ops.clone(),
        );
        let sessions = StaticSessions::from_settings(&settings).map_err(ContextError::Sessions)?;
        let guard = OriginGuard::new(
            settings.runner.callback_secret.as_deref(),
            Arc::new(sessions),
        );
        let api = Api::new(guard, service, ops.clone());

        ops.append(
            "info",
            "context.opened",
            "dispatch context ready",
            &[
                (
                    "runnerConfigured",
                    serde_json::json!(settings.runner_base_url().is_some()),
                ),
                (
                    "sideEffectWorkers",
                    serde_json::json!(settings.side_effects.workers),
                ),
            ],
        );

        Ok(Self {
            settings,
            state_root,
            store,
            ops,
            dispatch,
            api,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state_root(&self) -> &PathBuf {
        &self.state_root
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn ops(&self) -> &OpsLog {
        &self.ops
    }

    pub fn dispatch(&self) -> &DispatchClient {
        &self.dispatch
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    /// Drains queued side effects and joins the worker threads.
    pub fn shutdown(&self) {
        self.dispatch.shutdown();
        self.ops.info("context.closed", "side-effect workers stopped");
    }
}
