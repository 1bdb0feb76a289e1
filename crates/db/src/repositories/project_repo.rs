//! PostgreSQL-backed [`ProjectStore`] over the `projects` table.
//!
//! Every status-changing write runs `SELECT ... FOR UPDATE` inside a
//! transaction, applies the shared transition logic to the locked row and
//! writes it back before committing. Concurrent writers queue on the row
//! lock and the loser sees the winner's status.

use async_trait::async_trait;
use browserflow_core::project::DefinitionPatch;
use browserflow_core::status::ProjectStatus;
use browserflow_core::types::{ProjectId, TaskId};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::project::{Project, ProjectRow};
use crate::models::status::StatusIdMap;
use crate::store::{
    apply_claim, apply_definition_patch, apply_transition, ClaimOutcome, ProjectStore,
    StatusGuard, StoreError, TransitionEffects,
};

/// Column list for `projects` queries.
const COLUMNS: &str = "\
    id, status_id, instructions, output_schema, session_state, \
    live_stream_url, active_session_id, active_task_id, task_claimed_at, \
    last_result, last_error, last_run_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the row for the rest of the transaction.
    async fn lock(
        tx: &mut Transaction<'_, Postgres>,
        id: ProjectId,
    ) -> Result<Project, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, ProjectRow>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        row.try_into()
    }

    /// Persist every mutable column of `project`.
    async fn write_back(
        tx: &mut Transaction<'_, Postgres>,
        project: &Project,
    ) -> Result<(), StoreError> {
        let (live_stream_url, active_session_id) = match &project.live_session {
            Some(live) => (
                Some(live.live_stream_url.as_str()),
                Some(live.active_session_id.as_str()),
            ),
            None => (None, None),
        };
        sqlx::query(
            "UPDATE projects SET \
                 status_id = $2, instructions = $3, output_schema = $4, \
                 session_state = $5, live_stream_url = $6, active_session_id = $7, \
                 active_task_id = $8, task_claimed_at = $9, last_result = $10, \
                 last_error = $11, last_run_at = $12, updated_at = $13 \
             WHERE id = $1",
        )
        .bind(project.id)
        .bind(project.status.id())
        .bind(&project.instructions)
        .bind(project.output_schema.as_value())
        .bind(project.session_state.as_value())
        .bind(live_stream_url)
        .bind(active_session_id)
        .bind(project.active_task_id)
        .bind(project.task_claimed_at)
        .bind(&project.last_result)
        .bind(&project.last_error)
        .bind(project.last_run_at)
        .bind(project.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn insert(&self, project: &Project) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO projects \
                 (id, status_id, instructions, output_schema, session_state, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(project.id)
        .bind(project.status.id())
        .bind(&project.instructions)
        .bind(project.output_schema.as_value())
        .bind(project.session_state.as_value())
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Project::try_from)
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Project>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM projects ORDER BY created_at DESC, id DESC");
        sqlx::query_as::<_, ProjectRow>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Project::try_from)
            .collect()
    }

    async fn attempt_transition(
        &self,
        id: ProjectId,
        guard: StatusGuard,
        to: ProjectStatus,
        effects: TransitionEffects,
    ) -> Result<Project, StoreError> {
        if !guard.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: guard.status,
                to,
            });
        }

        let mut tx = self.pool.begin().await?;
        let mut project = Self::lock(&mut tx, id).await?;
        apply_transition(&mut project, guard, to, effects, Utc::now())?;
        Self::write_back(&mut tx, &project).await?;
        tx.commit().await?;

        tracing::debug!(project_id = %id, status = %project.status, "Project transitioned");
        Ok(project)
    }

    async fn update_definition(
        &self,
        id: ProjectId,
        patch: DefinitionPatch,
    ) -> Result<Project, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut project = Self::lock(&mut tx, id).await?;
        apply_definition_patch(&mut project, patch, Utc::now())?;
        Self::write_back(&mut tx, &project).await?;
        tx.commit().await?;
        Ok(project)
    }

    async fn claim_task(
        &self,
        id: ProjectId,
        task_id: TaskId,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut project = Self::lock(&mut tx, id).await?;
        let outcome = apply_claim(&mut project, task_id, Utc::now());
        if outcome == ClaimOutcome::Claimed {
            Self::write_back(&mut tx, &project).await?;
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete_unless_running(&self, id: ProjectId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let project = Self::lock(&mut tx, id).await?;
        if !project.status.is_deletable() {
            return Err(StoreError::NotDeletable {
                id,
                status: project.status,
            });
        }
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}
