//! Python engine.
//!
//! Runs the source with `python3 -c`. Input JSON arrives on stdin; whatever
//! the script prints to stdout is the result. Validation parses the source
//! with `ast.parse` in a separate interpreter, so nothing is executed.

use async_trait::async_trait;
use tokio::process::Command;

use super::engine::{EngineError, EvalContext, EvalOutput, LanguageEngine};
use super::subprocess;
use crate::script_types::ScriptLanguage;

const SYNTAX_CHECK: &str = "import ast, sys; ast.parse(sys.stdin.read(), '<script>')";

/// Engine for Python scripts.
pub struct PythonEngine {
    python_bin: String,
}

impl PythonEngine {
    pub fn new(python_bin: String) -> Self {
        Self { python_bin }
    }
}

#[async_trait]
impl LanguageEngine for PythonEngine {
    fn language(&self) -> ScriptLanguage {
        ScriptLanguage::Python
    }

    async fn validate(&self, source: &str) -> Result<(), EngineError> {
        let mut cmd = Command::new(&self.python_bin);
        cmd.arg("-c").arg(SYNTAX_CHECK);
        subprocess::check_with(&mut cmd, source).await
    }

    async fn evaluate(
        &self,
        source: &str,
        context: EvalContext,
    ) -> Result<EvalOutput, EngineError> {
        let mut cmd = Command::new(&self.python_bin);
        cmd.arg("-c").arg(source).env("PYTHONUNBUFFERED", "1");
        subprocess::evaluate_with(&mut cmd, &context).await
    }
}
