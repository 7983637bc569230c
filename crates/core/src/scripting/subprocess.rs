//! Shared subprocess management for the interpreter-backed engines.
//!
//! Provides [`run_command`], the spawn + I/O + timeout logic used by the
//! shell, Python and JavaScript engines. Each engine builds a
//! [`tokio::process::Command`] for its interpreter and delegates here.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::engine::{EngineError, EvalContext, EvalOutput};

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Budget for syntax checks.
pub(crate) const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw result of a finished child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Diagnostic text for a failed run: stderr, or the exit code if silent.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exited with code {}", self.exit_code)
        } else {
            stderr.to_string()
        }
    }
}

/// Spawn `cmd`, write `stdin_bytes` to its stdin, capture stdout/stderr,
/// and enforce `timeout`.
///
/// The caller sets program, arguments and environment beforehand. On
/// timeout the child is killed through `kill_on_drop`.
pub async fn run_command(
    cmd: &mut Command,
    stdin_bytes: &[u8],
    timeout: Duration,
) -> Result<ProcessOutput, EngineError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    // Drain both pipes before feeding stdin so neither side can block on a
    // full pipe buffer.
    let mut stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_stream(child.stderr.take()));
    let stdin_task = child.stdin.take().map(|mut stdin| {
        let payload = stdin_bytes.to_vec();
        tokio::spawn(async move {
            // The child may exit without reading stdin.
            let _ = stdin.write_all(&payload).await;
        })
    });

    let exchange = async {
        let status = child.wait().await?;
        let stdout_bytes = (&mut stdout_task).await.unwrap_or_default();
        let stderr_bytes = (&mut stderr_task).await.unwrap_or_default();
        Ok::<_, std::io::Error>((status, stdout_bytes, stderr_bytes))
    };
    let result = tokio::time::timeout(timeout, exchange).await;

    for task in [&stdout_task, &stderr_task] {
        task.abort();
    }
    if let Some(task) = stdin_task {
        task.abort();
    }

    match result {
        Ok(Ok((status, stdout_bytes, stderr_bytes))) => Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code: status.code().unwrap_or(-1),
            duration_ms: elapsed_ms(start),
        }),
        Ok(Err(e)) => Err(EngineError::Io(e)),
        // `child` is dropped on return, which kills the process.
        Err(_elapsed) => Err(EngineError::Timeout {
            elapsed_ms: elapsed_ms(start),
        }),
    }
}

/// Run an evaluation: input JSON on stdin, `SCRIPT_NAME`/`SCRIPT_VERSION`
/// in the environment, result on stdout.
///
/// Stdout is parsed as JSON when possible, otherwise returned as trimmed
/// text (`null` when empty). Each non-empty stderr line becomes a log line.
pub async fn evaluate_with(
    cmd: &mut Command,
    context: &EvalContext,
) -> Result<EvalOutput, EngineError> {
    cmd.env("SCRIPT_NAME", &context.script)
        .env("SCRIPT_VERSION", context.version.to_string());
    let payload = serde_json::to_vec(&context.input).unwrap_or_default();
    let output = run_command(cmd, &payload, context.timeout).await?;

    if !output.success() {
        return Err(EngineError::Eval(output.diagnostic()));
    }

    Ok(EvalOutput {
        value: parse_stdout(&output.stdout),
        logs: output
            .stderr
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// Run a syntax check that reads the source from stdin. A non-zero exit is
/// reported as a compile error carrying the interpreter's diagnostic.
pub async fn check_with(cmd: &mut Command, source: &str) -> Result<(), EngineError> {
    let output = run_command(cmd, source.as_bytes(), CHECK_TIMEOUT).await?;
    if output.success() {
        Ok(())
    } else {
        Err(EngineError::Compile(output.diagnostic()))
    }
}

fn parse_stdout(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Read an entire output stream, keeping at most [`MAX_OUTPUT_BYTES`].
/// Anything past the cap is read and discarded.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
