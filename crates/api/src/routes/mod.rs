pub mod health;
pub mod scripts;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /admin/plugins                       list, create
/// /admin/plugins/{name}                get, update, delete (?force=true)
/// /admin/plugins/{name}/activate       activate (PUT)
/// /admin/plugins/{name}/deactivate     deactivate (PUT)
/// /admin/plugins/{name}/run            evaluate (POST)
/// /admin/plugins/{name}/logs           log stream (SSE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/admin/plugins", scripts::router())
}
