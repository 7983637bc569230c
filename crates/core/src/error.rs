use crate::scripting::engine::EngineError;
use crate::scripting::store::StoreError;
use crate::scripting::validation::ValidationError;

/// Failure kinds surfaced by the registry and the dispatcher.
///
/// Validation, not-found and script-level failures ("your script is
/// broken") are kept apart from `Store`/`Internal` ("the system is
/// broken") so callers can map them to different responses.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Script '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("Script '{name}' not found")]
    NotFound { name: String },

    #[error("Script '{name}' is not active")]
    Inactive { name: String },

    #[error("Script '{name}' is at version {actual}, not {expected}")]
    VersionConflict {
        name: String,
        expected: i64,
        actual: i64,
    },

    /// The language engine rejected the source.
    #[error("{0}")]
    Compile(String),

    /// The language engine failed while running the script.
    #[error("{0}")]
    Eval(String),

    #[error("Script '{name}' timed out after {elapsed_ms}ms")]
    EvalTimeout { name: String, elapsed_ms: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }

    /// Wrap an engine failure for script `name`, keeping its diagnostic.
    pub fn from_engine(name: &str, err: EngineError) -> Self {
        match err {
            EngineError::Compile(msg) => Self::Compile(msg),
            EngineError::Eval(msg) => Self::Eval(msg),
            EngineError::Timeout { elapsed_ms } => Self::EvalTimeout {
                name: name.to_string(),
                elapsed_ms,
            },
            EngineError::Io(e) => Self::Internal(format!("engine I/O failure: {e}")),
        }
    }

    /// `true` for failures caused by the system rather than the request.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Internal(_))
    }
}
