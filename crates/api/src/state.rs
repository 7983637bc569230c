use std::sync::Arc;

use scriptd_core::error::CoreError;
use scriptd_core::scripting::dispatcher::ExecutionDispatcher;
use scriptd_core::scripting::engine::EngineSet;
use scriptd_core::scripting::logs::ScriptLogHub;
use scriptd_core::scripting::registry::{RegistryPolicy, ScriptRegistry};
use scriptd_core::scripting::store::ScriptStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Script registry, hydrated from the store at startup.
    pub registry: Arc<ScriptRegistry>,
    pub dispatcher: ExecutionDispatcher,
    /// Per-script log fan-out for the SSE endpoint.
    pub logs: Arc<ScriptLogHub>,
    /// Database connection pool, when running against PostgreSQL.
    pub pool: Option<scriptd_db::DbPool>,
}

impl AppState {
    /// Build the engines, load the registry from `store` and wire the
    /// dispatcher to a fresh log hub.
    pub async fn new(
        config: ServerConfig,
        store: Arc<dyn ScriptStore>,
        pool: Option<scriptd_db::DbPool>,
    ) -> Result<Self, CoreError> {
        let scripting = &config.scripting;
        let engines = Arc::new(EngineSet::standard(&scripting.engines, &scripting.languages));
        let policy = RegistryPolicy {
            default_active: scripting.default_active,
            compile_timeout: scripting.compile_timeout(),
        };

        let registry = Arc::new(ScriptRegistry::open(store, engines, policy).await?);
        let logs = Arc::new(ScriptLogHub::default());
        let dispatcher = ExecutionDispatcher::new(Arc::clone(&registry), Arc::clone(&logs));

        Ok(Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            logs,
            pool,
        })
    }
}
