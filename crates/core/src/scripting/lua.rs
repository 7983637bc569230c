//! In-process Lua 5.4 engine.
//!
//! Every evaluation gets a fresh `Lua` state on the blocking pool, so no
//! script state survives between calls. The JSON input is exposed as the
//! global `input`; `log(...)` and `print(...)` append to the captured log
//! lines; the chunk's return value becomes the JSON result.
//!
//! Runaway scripts are stopped by an instruction-count hook that fails once
//! the deadline has passed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use mlua::{HookTriggers, Lua, LuaSerdeExt, Variadic};
use serde_json::Value;

use super::engine::{EngineError, EvalContext, EvalOutput, LanguageEngine};
use crate::script_types::ScriptLanguage;

/// Instructions between deadline checks.
const HOOK_INSTRUCTION_INTERVAL: u32 = 1_000;

/// Engine for Lua scripts.
#[derive(Debug, Default)]
pub struct LuaEngine;

impl LuaEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LanguageEngine for LuaEngine {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Lua
    }

    async fn validate(&self, source: &str) -> Result<(), EngineError> {
        let source = source.to_string();
        tokio::task::spawn_blocking(move || compile_chunk(&source))
            .await
            .map_err(|e| EngineError::Compile(format!("lua worker failed: {e}")))?
    }

    async fn evaluate(
        &self,
        source: &str,
        context: EvalContext,
    ) -> Result<EvalOutput, EngineError> {
        let source = source.to_string();
        tokio::task::spawn_blocking(move || run_chunk(&source, &context))
            .await
            .map_err(|e| EngineError::Eval(format!("lua worker failed: {e}")))?
    }
}

fn compile_chunk(source: &str) -> Result<(), EngineError> {
    let lua = Lua::new();
    lua.load(source)
        .set_name("script")
        .into_function()
        .map(|_| ())
        .map_err(|e| EngineError::Compile(e.to_string()))
}

fn run_chunk(source: &str, context: &EvalContext) -> Result<EvalOutput, EngineError> {
    let start = Instant::now();
    let deadline = start + context.timeout;
    let logs = Arc::new(Mutex::new(Vec::new()));

    let lua = Lua::new();
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTION_INTERVAL),
        move |_lua, _debug| {
            if Instant::now() >= deadline {
                Err(mlua::Error::RuntimeError("deadline exceeded".to_string()))
            } else {
                Ok(())
            }
        },
    );

    let result = prepare_globals(&lua, context, &logs).and_then(|()| {
        let value: mlua::Value = lua.load(source).set_name(context.script.as_str()).eval()?;
        lua.from_value::<Value>(value)
    });

    match result {
        Ok(value) => {
            let logs = std::mem::take(&mut *logs.lock().unwrap_or_else(PoisonError::into_inner));
            Ok(EvalOutput { value, logs })
        }
        Err(_) if Instant::now() >= deadline => Err(EngineError::Timeout {
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }),
        Err(mlua::Error::SyntaxError { message, .. }) => Err(EngineError::Compile(message)),
        Err(e) => Err(EngineError::Eval(e.to_string())),
    }
}

fn prepare_globals(
    lua: &Lua,
    context: &EvalContext,
    logs: &Arc<Mutex<Vec<String>>>,
) -> mlua::Result<()> {
    let globals = lua.globals();
    globals.set("input", lua.to_value(&context.input)?)?;
    globals.set("script_name", context.script.as_str())?;
    globals.set("script_version", context.version)?;

    let sink = Arc::clone(logs);
    let log = lua.create_function(move |lua, args: Variadic<mlua::Value>| {
        let parts = args
            .iter()
            .map(|arg| match lua.coerce_string(arg.clone()) {
                Ok(Some(s)) => s.to_string_lossy().into_owned(),
                _ => format!("{arg:?}"),
            })
            .collect::<Vec<_>>();
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(parts.join("\t"));
        Ok(())
    })?;
    globals.set("log", log.clone())?;
    globals.set("print", log)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::scripting::test_helpers::context;

    #[tokio::test]
    async fn returns_value_computed_from_input() {
        let output = LuaEngine
            .evaluate("return { total = input.a + input.b }", context(json!({"a": 2, "b": 3})))
            .await
            .expect("evaluate");
        assert_eq!(output.value, json!({"total": 5}));
    }

    #[tokio::test]
    async fn print_and_log_are_captured() {
        let output = LuaEngine
            .evaluate("print('hi', 1)\nlog('bye')\nreturn 'done'", context(json!({})))
            .await
            .expect("evaluate");
        assert_eq!(output.logs, vec!["hi\t1", "bye"]);
        assert_eq!(output.value, "done");
    }

    #[tokio::test]
    async fn no_return_value_is_null() {
        let output = LuaEngine
            .evaluate("local x = 1", context(json!({})))
            .await
            .expect("evaluate");
        assert_eq!(output.value, Value::Null);
    }

    #[tokio::test]
    async fn runtime_error_is_eval_error() {
        let result = LuaEngine
            .evaluate("error('kaboom')", context(json!({})))
            .await;
        assert_matches!(result, Err(EngineError::Eval(msg)) if msg.contains("kaboom"));
    }

    #[tokio::test]
    async fn validate_rejects_bad_syntax_without_running() {
        assert_matches!(
            LuaEngine.validate("return (").await,
            Err(EngineError::Compile(_))
        );
        // Would fail at runtime, but compiles.
        LuaEngine
            .validate("error('never runs')")
            .await
            .expect("valid chunk");
    }

    #[tokio::test]
    async fn validate_yields_to_other_tasks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let source = "x = 1\n".repeat(200_000);
        let ticked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ticked);
        let ticker = tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        LuaEngine.validate(&source).await.expect("valid chunk");
        assert!(ticked.load(Ordering::SeqCst), "compile blocked the runtime thread");
        ticker.await.expect("ticker");
    }

    #[tokio::test]
    async fn infinite_loop_is_stopped_at_deadline() {
        let mut ctx = context(json!({}));
        ctx.timeout = Duration::from_millis(100);
        let result = LuaEngine.evaluate("while true do end", ctx).await;
        assert_matches!(result, Err(EngineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn each_evaluation_starts_from_fresh_state() {
        LuaEngine
            .evaluate("leaked = 42", context(json!({})))
            .await
            .expect("first run");
        let output = LuaEngine
            .evaluate("return leaked", context(json!({})))
            .await
            .expect("second run");
        assert_eq!(output.value, Value::Null);
    }
}
