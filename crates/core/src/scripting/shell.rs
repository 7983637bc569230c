//! Shell engine.
//!
//! Runs the source with `bash -c`, piping JSON input to stdin and capturing
//! stdout/stderr. Validation is `bash -n`, which parses without executing.

use async_trait::async_trait;
use tokio::process::Command;

use super::engine::{EngineError, EvalContext, EvalOutput, LanguageEngine};
use super::subprocess;
use crate::script_types::ScriptLanguage;

/// Engine for shell (bash) scripts.
pub struct ShellEngine {
    bash_bin: String,
}

impl ShellEngine {
    pub fn new(bash_bin: String) -> Self {
        Self { bash_bin }
    }
}

#[async_trait]
impl LanguageEngine for ShellEngine {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Shell
    }

    async fn validate(&self, source: &str) -> Result<(), EngineError> {
        let mut cmd = Command::new(&self.bash_bin);
        cmd.arg("-n");
        subprocess::check_with(&mut cmd, source).await
    }

    async fn evaluate(
        &self,
        source: &str,
        context: EvalContext,
    ) -> Result<EvalOutput, EngineError> {
        let mut cmd = Command::new(&self.bash_bin);
        cmd.arg("-c").arg(source);
        subprocess::evaluate_with(&mut cmd, &context).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
