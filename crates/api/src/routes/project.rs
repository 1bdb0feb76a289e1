//! Route definitions for the `/projects` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::project;
use crate::state::AppState;

/// Routes mounted at `/projects`.
///
/// ```text
/// GET    /                -> list
/// POST   /                -> create
/// GET    /{id}            -> get_by_id
/// PATCH  /{id}            -> update
/// DELETE /{id}            -> delete
/// POST   /{id}/run        -> run
/// POST   /{id}/stop       -> stop
/// POST   /{id}/resume     -> resume
/// POST   /{id}/continue   -> continue_run
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(project::list).post(project::create))
        .route(
            "/{id}",
            get(project::get_by_id)
                .patch(project::update)
                .delete(project::delete),
        )
        .route("/{id}/run", post(project::run))
        .route("/{id}/stop", post(project::stop))
        .route("/{id}/resume", post(project::resume))
        .route("/{id}/continue", post(project::continue_run))
}
