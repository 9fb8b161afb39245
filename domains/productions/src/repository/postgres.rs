//! PostgreSQL project store

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use tubeflow_common::{Error, RepositoryError, Result};

use super::ProjectStore;
use crate::domain::entities::{Project, ProjectSnapshot, StageRecord};

pub(crate) const PROJECT_COLUMNS: &str =
    "id, name, current_stage, created_at, updated_at, completed_at";

pub(crate) const STAGE_COLUMNS: &str =
    "project_id, stage, status, artifact, error, attempts, started_at, finished_at, updated_at";

#[derive(Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the domain migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {}", e)))
    }

    /// Get a reference to the underlying database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map schema constraint violations to `InvalidData`
fn classify(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) if db_err.constraint().is_some() => {
            RepositoryError::InvalidData(format!(
                "constraint {} violated: {}",
                db_err.constraint().unwrap_or_default(),
                db_err.message()
            ))
        }
        _ => RepositoryError::from(err),
    }
}

async fn upsert_project_tx(
    tx: &mut Transaction<'_, Postgres>,
    project: &Project,
) -> std::result::Result<(), RepositoryError> {
    let query = format!(
        "INSERT INTO productions ({PROJECT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (id) DO UPDATE SET \
            name = EXCLUDED.name, \
            current_stage = EXCLUDED.current_stage, \
            updated_at = EXCLUDED.updated_at, \
            completed_at = EXCLUDED.completed_at"
    );
    sqlx::query(&query)
        .bind(project.id)
        .bind(&project.name)
        .bind(project.current_stage)
        .bind(project.created_at)
        .bind(project.updated_at)
        .bind(project.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(classify)?;
    Ok(())
}

async fn upsert_stage_tx(
    tx: &mut Transaction<'_, Postgres>,
    record: &StageRecord,
) -> std::result::Result<(), RepositoryError> {
    let query = format!(
        "INSERT INTO production_stages ({STAGE_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (project_id, stage) DO UPDATE SET \
            status = EXCLUDED.status, \
            artifact = EXCLUDED.artifact, \
            error = EXCLUDED.error, \
            attempts = EXCLUDED.attempts, \
            started_at = EXCLUDED.started_at, \
            finished_at = EXCLUDED.finished_at, \
            updated_at = EXCLUDED.updated_at"
    );
    sqlx::query(&query)
        .bind(record.project_id)
        .bind(record.stage)
        .bind(record.status)
        .bind(&record.artifact)
        .bind(&record.error)
        .bind(record.attempts)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(classify)?;
    Ok(())
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn get(&self, id: Uuid) -> Result<Option<ProjectSnapshot>> {
        // Both reads must see the same committed save
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM productions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(project) = project else {
            tx.commit().await?;
            return Ok(None);
        };

        let stages = sqlx::query_as::<_, StageRecord>(&format!(
            "SELECT {STAGE_COLUMNS} FROM production_stages WHERE project_id = $1 ORDER BY stage"
        ))
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        ProjectSnapshot::from_parts(project, stages).map(Some)
    }

    async fn save(&self, project: &Project, stages: &[StageRecord]) -> Result<()> {
        ProjectSnapshot::from_parts(project.clone(), stages.to_vec())?;

        let mut tx = self.pool.begin().await?;
        upsert_project_tx(&mut tx, project).await?;
        for record in stages {
            upsert_stage_tx(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        // production_stages rows cascade
        let result = sqlx::query("DELETE FROM productions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
