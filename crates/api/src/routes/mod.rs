pub mod health;
pub mod project;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /projects                     list, create
/// /projects/{id}                get, update, delete
/// /projects/{id}/run            start a run (202)
/// /projects/{id}/stop           stop a running project
/// /projects/{id}/resume         live session of a blocked project
/// /projects/{id}/continue       continue a blocked run (202)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/projects", project::router())
}
