//! Uniform language engine interface and shared types.
//!
//! Defines [`LanguageEngine`], the trait every language adapter implements,
//! along with [`EvalContext`], [`EvalOutput`], [`EngineError`] and the
//! startup-built [`EngineSet`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::javascript::JavaScriptEngine;
use super::lua::LuaEngine;
use super::python::PythonEngine;
use super::shell::ShellEngine;
use crate::script_types::ScriptLanguage;

/// Everything an engine needs to run one evaluation.
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// Name of the script being evaluated (exposed to subprocesses as `SCRIPT_NAME`).
    pub script: String,
    /// Version of the snapshot being evaluated.
    pub version: i64,
    /// JSON input handed to the script.
    pub input: Value,
    /// Wall-clock budget; the engine must stop the script once it is spent.
    pub timeout: Duration,
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalOutput {
    /// Value produced by the script.
    pub value: Value,
    /// Log lines emitted while running.
    pub logs: Vec<String>,
}

/// Errors reported by a language engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The source failed to parse or compile. Carries the engine diagnostic.
    #[error("{0}")]
    Compile(String),
    /// The script failed at runtime. Carries the engine diagnostic.
    #[error("{0}")]
    Eval(String),
    /// The script exceeded its budget and was stopped.
    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed wall-clock time before the script was stopped.
        elapsed_ms: u64,
    },
    /// The engine could not be started or talked to.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability interface implemented once per supported language.
///
/// Engines hold no per-script state between calls: every `evaluate` gets
/// the full source and context.
#[async_trait]
pub trait LanguageEngine: Send + Sync {
    /// Language this engine serves.
    fn language(&self) -> ScriptLanguage;

    /// Check that `source` compiles, without running it.
    async fn validate(&self, source: &str) -> Result<(), EngineError>;

    /// Run `source` against `context.input`.
    async fn evaluate(&self, source: &str, context: EvalContext)
        -> Result<EvalOutput, EngineError>;
}

/// Interpreter locations for the subprocess-backed engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub bash_bin: String,
    pub python_bin: String,
    pub node_bin: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bash_bin: "bash".to_string(),
            python_bin: "python3".to_string(),
            node_bin: "node".to_string(),
        }
    }
}

/// Closed mapping from language to its engine, built once at startup.
#[derive(Default, Clone)]
pub struct EngineSet {
    engines: HashMap<ScriptLanguage, Arc<dyn LanguageEngine>>,
}

impl EngineSet {
    /// An empty set. Every language is unsupported until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard engines for `languages`.
    pub fn standard(config: &EngineConfig, languages: &[ScriptLanguage]) -> Self {
        languages.iter().fold(Self::new(), |set, lang| {
            let engine: Arc<dyn LanguageEngine> = match lang {
                ScriptLanguage::Lua => Arc::new(LuaEngine::new()),
                ScriptLanguage::Shell => Arc::new(ShellEngine::new(config.bash_bin.clone())),
                ScriptLanguage::Python => Arc::new(PythonEngine::new(config.python_bin.clone())),
                ScriptLanguage::JavaScript => {
                    Arc::new(JavaScriptEngine::new(config.node_bin.clone()))
                }
            };
            set.with(engine)
        })
    }

    /// Register `engine` under its own language, replacing any previous one.
    pub fn with(mut self, engine: Arc<dyn LanguageEngine>) -> Self {
        self.engines.insert(engine.language(), engine);
        self
    }

    pub fn get(&self, language: ScriptLanguage) -> Option<&Arc<dyn LanguageEngine>> {
        self.engines.get(&language)
    }

    pub fn supports(&self, language: ScriptLanguage) -> bool {
        self.engines.contains_key(&language)
    }

    /// Registered languages in declaration order.
    pub fn languages(&self) -> Vec<ScriptLanguage> {
        ScriptLanguage::ALL
            .into_iter()
            .filter(|lang| self.supports(*lang))
            .collect()
    }
}

impl std::fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSet")
            .field("languages", &self.languages())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
