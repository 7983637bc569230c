//! Route definitions for script management endpoints.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::scripts;
use crate::state::AppState;

/// Admin routes mounted at `/admin/plugins`.
///
/// ```text
/// POST   /                     -> create_script
/// GET    /                     -> list_scripts
/// GET    /{name}               -> get_script
/// PUT    /{name}               -> update_script
/// DELETE /{name}               -> delete_script
/// PUT    /{name}/activate      -> activate_script
/// PUT    /{name}/deactivate    -> deactivate_script
/// POST   /{name}/run           -> run_script
/// GET    /{name}/logs          -> stream_logs
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(scripts::list_scripts).post(scripts::create_script),
        )
        .route(
            "/{name}",
            get(scripts::get_script)
                .put(scripts::update_script)
                .delete(scripts::delete_script),
        )
        .route("/{name}/activate", put(scripts::activate_script))
        .route("/{name}/deactivate", put(scripts::deactivate_script))
        .route("/{name}/run", post(scripts::run_script))
        .route("/{name}/logs", get(scripts::stream_logs))
}
