//! Admin handlers for script management and execution.
//!
//! Request bodies are read as raw bytes and parsed here so that a missing
//! body reaches the validation pipeline (and its `Missing body` message)
//! instead of being rejected by an extractor.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use scriptd_core::error::CoreError;
use scriptd_core::scripting::dispatcher::Evaluation;
use scriptd_core::scripting::document::{Activation, ScriptDocument, ScriptStatus};
use scriptd_core::scripting::logs::{LogSubscription, ScriptLogEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::{AppError, AppResult};
use crate::query::{DeleteParams, ListScriptsParams};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for the run endpoint. Both fields are optional.
#[derive(Debug, Deserialize)]
pub struct RunScriptRequest {
    /// JSON handed to the script (default: `{}`).
    #[serde(default = "empty_object")]
    pub input: Value,
    /// Run budget in milliseconds, clamped to the configured maximum.
    pub timeout_ms: Option<u64>,
}

impl Default for RunScriptRequest {
    fn default() -> Self {
        Self {
            input: empty_object(),
            timeout_ms: None,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Outcome of an activate/deactivate call.
#[derive(Debug, Serialize)]
pub struct ActivationResponse {
    pub name: String,
    pub active: bool,
    /// `false` when the script was already in the requested state.
    pub changed: bool,
}

/// Outcome of a delete call.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub name: String,
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Script CRUD handlers
// ---------------------------------------------------------------------------

/// POST /admin/plugins
///
/// Validate, compile and register a new script.
pub async fn create_script(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<DataResponse<ScriptStatus>>)> {
    let body = parse_body(&body)?;
    let status = state.registry.create(body.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: status })))
}

/// GET /admin/plugins
///
/// List live scripts matching the query parameters.
pub async fn list_scripts(
    State(state): State<AppState>,
    Query(params): Query<ListScriptsParams>,
) -> AppResult<Json<DataResponse<Vec<ScriptDocument>>>> {
    let query = params.into_query()?;
    let scripts = state
        .registry
        .list(&query)
        .await?
        .iter()
        .map(|snapshot| snapshot.document.clone())
        .collect();
    Ok(Json(DataResponse { data: scripts }))
}

/// GET /admin/plugins/{name}
pub async fn get_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<DataResponse<ScriptDocument>>> {
    let snapshot = state
        .registry
        .get(&name)
        .ok_or_else(|| CoreError::not_found(&name))?;
    Ok(Json(DataResponse {
        data: snapshot.document.clone(),
    }))
}

/// PUT /admin/plugins/{name}
///
/// Merge the body onto the script and publish it as the next version.
pub async fn update_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> AppResult<Json<DataResponse<ScriptStatus>>> {
    let patch = parse_body(&body)?;
    let status = state.registry.update(&name, patch.as_ref()).await?;
    Ok(Json(DataResponse { data: status }))
}

/// PUT /admin/plugins/{name}/activate
pub async fn activate_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<DataResponse<ActivationResponse>>> {
    set_active(&state, name, true).await
}

/// PUT /admin/plugins/{name}/deactivate
pub async fn deactivate_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<DataResponse<ActivationResponse>>> {
    set_active(&state, name, false).await
}

async fn set_active(
    state: &AppState,
    name: String,
    active: bool,
) -> AppResult<Json<DataResponse<ActivationResponse>>> {
    let changed = match state.registry.activate(&name, active).await? {
        Activation::Changed => true,
        Activation::NoOp => false,
        Activation::NotFound => return Err(CoreError::not_found(&name).into()),
    };
    Ok(Json(DataResponse {
        data: ActivationResponse {
            name,
            active,
            changed,
        },
    }))
}

/// DELETE /admin/plugins/{name}
///
/// Soft delete by default; `?force=true` removes the record and frees the name.
pub async fn delete_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<DeleteParams>,
) -> AppResult<Json<DataResponse<DeleteResponse>>> {
    let deleted = if params.force {
        state.registry.force_delete(&name).await?
    } else {
        state.registry.delete(&name).await?
    };

    if !deleted {
        return Err(CoreError::not_found(&name).into());
    }

    Ok(Json(DataResponse {
        data: DeleteResponse {
            name,
            force: params.force,
        },
    }))
}

// ---------------------------------------------------------------------------
// Execution handlers
// ---------------------------------------------------------------------------

/// POST /admin/plugins/{name}/run
///
/// Evaluate the live version of the script.
pub async fn run_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> AppResult<Json<DataResponse<Evaluation>>> {
    let request = if is_blank(&body) {
        RunScriptRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid run request: {e}")))?
    };

    let timeout = state.config.scripting.run_timeout(request.timeout_ms);
    let evaluation = state
        .dispatcher
        .evaluate(&name, request.input, timeout)
        .await?;
    Ok(Json(DataResponse { data: evaluation }))
}

/// GET /admin/plugins/{name}/logs
///
/// Server-sent events carrying the script's log lines (`event: log`). A
/// subscriber that falls behind receives `event: lagged` with the number of
/// skipped lines. Closing the connection unsubscribes.
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if state.registry.get(&name).is_none() {
        return Err(CoreError::not_found(&name).into());
    }

    let mut subscription = state.logs.subscribe(&name);
    let receiver = subscription
        .take_receiver()
        .ok_or_else(|| AppError::InternalError("log subscription has no receiver".to_string()))?;
    tracing::debug!(script = %name, "Log stream opened");

    let stream = LogStream {
        events: BroadcastStream::new(receiver),
        _subscription: subscription,
    }
    .filter_map(to_sse_event);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Log events for one script. Field order matters: the receiver is dropped
/// before the subscription releases the channel.
struct LogStream {
    events: BroadcastStream<ScriptLogEvent>,
    _subscription: LogSubscription,
}

impl Stream for LogStream {
    type Item = Result<ScriptLogEvent, BroadcastStreamRecvError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

fn to_sse_event(
    item: Result<ScriptLogEvent, BroadcastStreamRecvError>,
) -> Option<Result<Event, Infallible>> {
    match item {
        Ok(event) => Event::default().event("log").json_data(&event).ok().map(Ok),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            Some(Ok(Event::default().event("lagged").data(skipped.to_string())))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_blank(body: &Bytes) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// An empty body is `None`; anything else must be valid JSON.
fn parse_body(body: &Bytes) -> AppResult<Option<Value>> {
    if is_blank(body) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}
