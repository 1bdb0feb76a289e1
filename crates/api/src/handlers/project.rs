//! Handlers for the `/projects` resource.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use browserflow_core::project::{NewProject, UpdateProject};
use browserflow_core::session::LiveSessionRef;
use browserflow_core::types::ProjectId;
use browserflow_db::models::project::Project;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Outward shape of a project. Session credentials are never exposed; only
/// whether some are stored.
#[derive(Debug, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub has_session_state: bool,
}

impl From<Project> for ProjectView {
    fn from(project: Project) -> Self {
        let has_session_state = project.has_session_state();
        Self {
            project,
            has_session_state,
        }
    }
}

type IdPath = Result<Path<ProjectId>, PathRejection>;

/// GET /api/v1/projects
pub async fn list(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<ProjectView>>>> {
    let projects = state.dispatcher.list().await?;
    Ok(Json(DataResponse {
        data: projects.into_iter().map(ProjectView::from).collect(),
    }))
}

/// POST /api/v1/projects
pub async fn create(
    State(state): State<AppState>,
    input: Result<Json<NewProject>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<ProjectView>>)> {
    let Json(input) = input?;
    let project = state.dispatcher.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: project.into(),
        }),
    ))
}

/// GET /api/v1/projects/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    id: IdPath,
) -> AppResult<Json<DataResponse<ProjectView>>> {
    let Path(id) = id?;
    let project = state.dispatcher.get(id).await?;
    Ok(Json(DataResponse {
        data: project.into(),
    }))
}

/// PATCH /api/v1/projects/{id}
pub async fn update(
    State(state): State<AppState>,
    id: IdPath,
    input: Result<Json<UpdateProject>, JsonRejection>,
) -> AppResult<Json<DataResponse<ProjectView>>> {
    let Path(id) = id?;
    let Json(input) = input?;
    let project = state.dispatcher.update(id, input).await?;
    Ok(Json(DataResponse {
        data: project.into(),
    }))
}

/// DELETE /api/v1/projects/{id}
pub async fn delete(State(state): State<AppState>, id: IdPath) -> AppResult<StatusCode> {
    let Path(id) = id?;
    state.dispatcher.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/projects/{id}/run
///
/// Accepted, not finished: the run proceeds on a worker.
pub async fn run(
    State(state): State<AppState>,
    id: IdPath,
) -> AppResult<(StatusCode, Json<DataResponse<ProjectView>>)> {
    let Path(id) = id?;
    let project = state.dispatcher.run(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: project.into(),
        }),
    ))
}

/// POST /api/v1/projects/{id}/stop
pub async fn stop(
    State(state): State<AppState>,
    id: IdPath,
) -> AppResult<Json<DataResponse<ProjectView>>> {
    let Path(id) = id?;
    let project = state.dispatcher.stop(id).await?;
    Ok(Json(DataResponse {
        data: project.into(),
    }))
}

/// POST /api/v1/projects/{id}/resume
///
/// Returns the preserved live session of a BLOCKED project.
pub async fn resume(
    State(state): State<AppState>,
    id: IdPath,
) -> AppResult<Json<DataResponse<LiveSessionRef>>> {
    let Path(id) = id?;
    let live = state.dispatcher.resume(id).await?;
    Ok(Json(DataResponse { data: live }))
}

/// POST /api/v1/projects/{id}/continue
pub async fn continue_run(
    State(state): State<AppState>,
    id: IdPath,
) -> AppResult<(StatusCode, Json<DataResponse<ProjectView>>)> {
    let Path(id) = id?;
    let project = state.dispatcher.continue_run(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: project.into(),
        }),
    ))
}
