//! Persisted `ScanJob` rows, reconciled by the Scanner Job Coordinator (C10).

use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::error::{map_sqlx_error, Error, Result};
use crate::models::{LibraryId, ScanJob, ScanJobId, ScanStatus};

#[derive(Clone)]
pub struct ScanJobRepository {
    pool: PgPool,
}

impl ScanJobRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, job: &ScanJob) -> Result<ScanJob> {
        let row = sqlx::query(
            "INSERT INTO scan_jobs (id, library_id, status, files_found, files_processed, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, library_id, status, files_found, files_processed, updated_at",
        )
        .bind(&job.id)
        .bind(&job.library_id)
        .bind(job.status.as_str())
        .bind(i64::try_from(job.files_found).unwrap_or(i64::MAX))
        .bind(i64::try_from(job.files_processed).unwrap_or(i64::MAX))
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row_to_job(row)
    }

    pub async fn get(&self, id: &ScanJobId) -> Result<Option<ScanJob>> {
        let row = sqlx::query(
            "SELECT id, library_id, status, files_found, files_processed, updated_at FROM scan_jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_job).transpose()
    }

    /// The public scanner API is keyed by `library_id`; callers resolve the
    /// one non-terminal row for a library through this query.
    pub async fn find_active_for_library(&self, library_id: &LibraryId) -> Result<Option<ScanJob>> {
        let row = sqlx::query(
            "SELECT id, library_id, status, files_found, files_processed, updated_at
             FROM scan_jobs
             WHERE library_id = $1 AND status NOT IN ('completed', 'failed')
             ORDER BY updated_at DESC
             LIMIT 1",
        )
        .bind(library_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn list_non_terminal(&self) -> Result<Vec<ScanJob>> {
        let rows = sqlx::query(
            "SELECT id, library_id, status, files_found, files_processed, updated_at
             FROM scan_jobs WHERE status NOT IN ('completed', 'failed')",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn update_status(&self, id: &ScanJobId, status: ScanStatus) -> Result<()> {
        sqlx::query("UPDATE scan_jobs SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_progress(&self, id: &ScanJobId, files_found: u64, files_processed: u64) -> Result<()> {
        sqlx::query(
            "UPDATE scan_jobs SET files_found = $2, files_processed = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(i64::try_from(files_found).unwrap_or(i64::MAX))
        .bind(i64::try_from(files_processed).unwrap_or(i64::MAX))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &ScanJobId) -> Result<()> {
        sqlx::query("DELETE FROM scan_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_job(row: PgRow) -> Result<ScanJob> {
    let status: String = row.try_get("status")?;
    let files_found: i64 = row.try_get("files_found")?;
    let files_processed: i64 = row.try_get("files_processed")?;

    Ok(ScanJob {
        id: row.try_get("id")?,
        library_id: row.try_get("library_id")?,
        status: ScanStatus::from_str(&status)
            .ok_or_else(|| Error::Internal(format!("unknown scan status {status}")))?,
        files_found: u64::try_from(files_found).unwrap_or(0),
        files_processed: u64::try_from(files_processed).unwrap_or(0),
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new().connect_lazy("postgres://localhost/test").unwrap()
    }

    fn sample_job(library_id: LibraryId) -> ScanJob {
        ScanJob {
            id: ScanJobId::new(),
            library_id,
            status: ScanStatus::Running,
            files_found: 10_000,
            files_processed: 500,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn create_and_find_active_round_trips() {
        let repo = ScanJobRepository::new(lazy_pool());
        let library_id = LibraryId::from_string("lib-1".to_string());
        let created = repo.create(&sample_job(library_id.clone())).await.unwrap();
        assert_eq!(created.status, ScanStatus::Running);

        let active = repo.find_active_for_library(&library_id).await.unwrap();
        assert_eq!(active.map(|j| j.id), Some(created.id));

        repo.update_progress(&created.id, 10_000, 750).await.unwrap();
        let refreshed = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(refreshed.files_processed, 750);

        repo.update_status(&created.id, ScanStatus::Completed).await.unwrap();
        assert!(repo.find_active_for_library(&library_id).await.unwrap().is_none());
    }
}
