//! Runs published script snapshots through their language engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use super::document::ScriptSnapshot;
use super::engine::{EngineSet, EvalContext};
use super::logs::{LogLevel, ScriptLogEvent, ScriptLogHub};
use super::registry::ScriptRegistry;
use crate::error::CoreError;

/// Outcome of a successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub name: String,
    /// Version of the snapshot that actually ran.
    pub version: i64,
    pub value: Value,
    pub logs: Vec<String>,
    pub duration_ms: u64,
}

/// Resolves a script name to its current snapshot and evaluates it.
///
/// The snapshot is captured once, up front; an update published while the
/// evaluation runs does not affect it.
#[derive(Debug, Clone)]
pub struct ExecutionDispatcher {
    registry: Arc<ScriptRegistry>,
    engines: Arc<EngineSet>,
    logs: Arc<ScriptLogHub>,
}

impl ExecutionDispatcher {
    pub fn new(registry: Arc<ScriptRegistry>, logs: Arc<ScriptLogHub>) -> Self {
        let engines = Arc::clone(registry.engines());
        Self {
            registry,
            engines,
            logs,
        }
    }

    /// Evaluate the live version of `name` against `input`.
    pub async fn evaluate(
        &self,
        name: &str,
        input: Value,
        timeout: Duration,
    ) -> Result<Evaluation, CoreError> {
        let snapshot = self
            .registry
            .get(name)
            .ok_or_else(|| CoreError::not_found(name))?;
        self.evaluate_snapshot(snapshot, input, timeout).await
    }

    /// Evaluate an already captured snapshot.
    pub async fn evaluate_snapshot(
        &self,
        snapshot: Arc<ScriptSnapshot>,
        input: Value,
        timeout: Duration,
    ) -> Result<Evaluation, CoreError> {
        let name = snapshot.name();
        if !snapshot.is_active() {
            return Err(CoreError::Inactive {
                name: name.to_string(),
            });
        }

        let language = snapshot.document.language;
        let engine = self.engines.get(language).ok_or_else(|| {
            CoreError::Internal(format!("no engine registered for '{language}'"))
        })?;

        let context = EvalContext {
            script: name.to_string(),
            version: snapshot.version(),
            input,
            timeout,
        };

        let start = Instant::now();
        let outcome =
            match tokio::time::timeout(timeout, engine.evaluate(&snapshot.source, context)).await {
                Ok(result) => result.map_err(|e| CoreError::from_engine(name, e)),
                Err(_) => Err(CoreError::EvalTimeout {
                    name: name.to_string(),
                    elapsed_ms: elapsed_ms(start),
                }),
            };
        let duration_ms = elapsed_ms(start);

        match outcome {
            Ok(output) => {
                for line in &output.logs {
                    self.logs.publish(ScriptLogEvent::new(
                        name,
                        snapshot.version(),
                        LogLevel::Info,
                        line.as_str(),
                    ));
                }
                tracing::debug!(
                    script = %name,
                    version = snapshot.version(),
                    duration_ms,
                    "Script evaluated"
                );
                Ok(Evaluation {
                    name: name.to_string(),
                    version: snapshot.version(),
                    value: output.value,
                    logs: output.logs,
                    duration_ms,
                })
            }
            Err(err) => {
                self.logs.publish(ScriptLogEvent::new(
                    name,
                    snapshot.version(),
                    LogLevel::Error,
                    err.to_string(),
                ));
                if err.is_internal() {
                    tracing::error!(script = %name, error = %err, "Script evaluation failed");
                } else {
                    tracing::warn!(script = %name, duration_ms, error = %err, "Script evaluation failed");
                }
                Err(err)
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::scripting::lua::LuaEngine;
    use crate::scripting::registry::RegistryPolicy;
    use crate::scripting::store::MemoryStore;
    use crate::scripting::test_helpers::{EchoEngine, GateEngine};

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn dispatcher_with(engines: EngineSet) -> (Arc<ScriptRegistry>, ExecutionDispatcher) {
        let registry = ScriptRegistry::open(
            Arc::new(MemoryStore::new()),
            Arc::new(engines),
            RegistryPolicy::default(),
        )
        .await
        .expect("open registry");
        let registry = Arc::new(registry);
        let dispatcher = ExecutionDispatcher::new(Arc::clone(&registry), Arc::default());
        (registry, dispatcher)
    }

    async fn dispatcher() -> (Arc<ScriptRegistry>, ExecutionDispatcher) {
        dispatcher_with(
            EngineSet::new()
                .with(Arc::new(LuaEngine::new()))
                .with(Arc::new(EchoEngine)),
        )
        .await
    }

    #[tokio::test]
    async fn evaluates_live_lua_script() {
        let (registry, dispatcher) = dispatcher().await;
        registry
            .create(Some(&json!({"name": "double", "code": "log('x is', input.x)\nreturn input.x * 2", "lang": "lua"})))
            .await
            .expect("create");

        let evaluation = dispatcher
            .evaluate("double", json!({"x": 21}), TIMEOUT)
            .await
            .expect("evaluate");
        assert_eq!(evaluation.value, json!(42));
        assert_eq!(evaluation.version, 0);
        assert_eq!(evaluation.logs, vec!["x is\t21"]);
    }

    #[tokio::test]
    async fn missing_script_is_not_found() {
        let (_registry, dispatcher) = dispatcher().await;
        assert_matches!(
            dispatcher.evaluate("ghost", json!({}), TIMEOUT).await,
            Err(CoreError::NotFound { name }) if name == "ghost"
        );
    }

    #[tokio::test]
    async fn inactive_and_deleted_scripts_do_not_run() {
        let (registry, dispatcher) = dispatcher().await;
        registry
            .create(Some(&json!({"name": "off", "code": "x", "lang": "js", "active": false})))
            .await
            .expect("create");
        assert_matches!(
            dispatcher.evaluate("off", json!({}), TIMEOUT).await,
            Err(CoreError::Inactive { .. })
        );

        registry.activate("off", true).await.expect("activate");
        dispatcher
            .evaluate("off", json!({}), TIMEOUT)
            .await
            .expect("runs once active");

        registry.delete("off").await.expect("delete");
        assert_matches!(
            dispatcher.evaluate("off", json!({}), TIMEOUT).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn engine_failure_is_eval_error_with_diagnostic() {
        let (registry, dispatcher) = dispatcher().await;
        registry
            .create(Some(&json!({"name": "broken", "code": "fail now", "lang": "js"})))
            .await
            .expect("create");

        let err = dispatcher
            .evaluate("broken", json!({}), TIMEOUT)
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::Eval(msg) if msg == "Error: fail now");
    }

    #[tokio::test]
    async fn slow_script_times_out() {
        let (registry, dispatcher) = dispatcher().await;
        registry
            .create(Some(&json!({"name": "slow", "code": "sleep forever", "lang": "js"})))
            .await
            .expect("create");

        let err = dispatcher
            .evaluate("slow", json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_matches!(err, CoreError::EvalTimeout { name, elapsed_ms } if name == "slow" && elapsed_ms >= 50);
    }

    #[tokio::test]
    async fn in_flight_evaluation_keeps_its_snapshot() {
        let gate = Arc::new(GateEngine::default());
        let (started, release) = (Arc::clone(&gate.started), Arc::clone(&gate.release));
        let (registry, dispatcher) = dispatcher_with(EngineSet::new().with(gate)).await;
        registry
            .create(Some(&json!({"name": "iso", "code": "version zero", "lang": "js"})))
            .await
            .expect("create");

        let in_flight = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.evaluate("iso", json!({}), TIMEOUT).await })
        };
        started.notified().await;

        registry
            .update("iso", Some(&json!({"code": "version one"})))
            .await
            .expect("update while running");
        release.notify_one();

        let evaluation = in_flight.await.expect("join").expect("evaluate");
        assert_eq!(evaluation.version, 0);
        assert_eq!(evaluation.value, json!("version zero"));

        release.notify_one();
        let evaluation = dispatcher
            .evaluate("iso", json!({}), TIMEOUT)
            .await
            .expect("evaluate");
        assert_eq!(evaluation.version, 1);
        assert_eq!(evaluation.value, json!("version one"));
    }

    #[tokio::test]
    async fn logs_and_failures_are_published() {
        let hub = Arc::new(ScriptLogHub::default());
        let registry = Arc::new(
            ScriptRegistry::open(
                Arc::new(MemoryStore::new()),
                Arc::new(EngineSet::new().with(Arc::new(EchoEngine))),
                RegistryPolicy::default(),
            )
            .await
            .expect("open"),
        );
        let dispatcher = ExecutionDispatcher::new(Arc::clone(&registry), Arc::clone(&hub));
        registry
            .create(Some(&json!({"name": "greet", "code": "hello", "lang": "js"})))
            .await
            .expect("create");

        let mut subscription = hub.subscribe("greet");
        dispatcher
            .evaluate("greet", json!({}), TIMEOUT)
            .await
            .expect("evaluate");
        let event = subscription.recv().await.expect("open").expect("event");
        assert_eq!(event.level, LogLevel::Info);
        assert_eq!(event.message, "ran hello");

        registry
            .update("greet", Some(&json!({"code": "fail hard"})))
            .await
            .expect("update");
        dispatcher
            .evaluate("greet", json!({}), TIMEOUT)
            .await
            .unwrap_err();
        let event = subscription.recv().await.expect("open").expect("event");
        assert_eq!(event.level, LogLevel::Error);
        assert_eq!(event.version, 1);
        assert_eq!(event.message, "Error: fail hard");
    }

    #[tokio::test]
    async fn greet_scenario_runs_latest_version() {
        let (registry, dispatcher) = dispatcher().await;
        registry
            .create(Some(&json!({"name": "greet", "code": "print('hi')", "lang": "js"})))
            .await
            .expect("create");
        registry
            .update("greet", Some(&json!({"code": "print('bye')"})))
            .await
            .expect("update");

        let evaluation = dispatcher
            .evaluate("greet", json!({}), TIMEOUT)
            .await
            .expect("evaluate");
        assert_eq!(evaluation.version, 1);
        assert_eq!(evaluation.value["source"], "print('bye')");

        assert!(registry.force_delete("greet").await.expect("force delete"));
        assert_matches!(
            dispatcher.evaluate("greet", json!({}), TIMEOUT).await,
            Err(CoreError::NotFound { .. })
        );
    }
}
