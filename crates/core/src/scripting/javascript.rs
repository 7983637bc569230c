//! JavaScript engine backed by `node`.
//!
//! Evaluation runs the source with `node -e`; validation compiles it with
//! `vm.Script`, which parses without running.

use async_trait::async_trait;
use tokio::process::Command;

use super::engine::{EngineError, EvalContext, EvalOutput, LanguageEngine};
use super::subprocess;
use crate::script_types::ScriptLanguage;

const SYNTAX_CHECK: &str = "new (require('vm').Script)(require('fs').readFileSync(0, 'utf8'), { filename: 'script.js' })";

/// Engine for JavaScript scripts.
pub struct JavaScriptEngine {
    node_bin: String,
}

impl JavaScriptEngine {
    pub fn new(node_bin: String) -> Self {
        Self { node_bin }
    }
}

#[async_trait]
impl LanguageEngine for JavaScriptEngine {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::JavaScript
    }

    async fn validate(&self, source: &str) -> Result<(), EngineError> {
        let mut cmd = Command::new(&self.node_bin);
        cmd.arg("-e").arg(SYNTAX_CHECK);
        subprocess::check_with(&mut cmd, source).await
    }

    async fn evaluate(
        &self,
        source: &str,
        context: EvalContext,
    ) -> Result<EvalOutput, EngineError> {
        let mut cmd = Command::new(&self.node_bin);
        cmd.arg("-e").arg(source);
        subprocess::evaluate_with(&mut cmd, &context).await
    }
}
