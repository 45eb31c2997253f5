use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::store::traits::{JobOutcome, JobRun, JobRunStore};

#[derive(sqlx::FromRow)]
struct Row {
    job_name: String,
    started_at: Option<String>,
    ended_at: Option<String>,
    outcome: Option<String>,
    next_fire_at: Option<String>,
}

#[derive(Clone)]
pub struct SqliteJobRunStore {
    pool: SqlitePool,
}

impl SqliteJobRunStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn outcome_to_str(outcome: JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Ok => "ok",
        JobOutcome::Error => "error",
        JobOutcome::Cancelled => "cancelled",
        JobOutcome::Overlap => "overlap",
        JobOutcome::Disabled => "disabled",
    }
}

fn outcome_from_str(s: &str) -> Option<JobOutcome> {
    match s {
        "ok" => Some(JobOutcome::Ok),
        "error" => Some(JobOutcome::Error),
        "cancelled" => Some(JobOutcome::Cancelled),
        "overlap" => Some(JobOutcome::Overlap),
        "disabled" => Some(JobOutcome::Disabled),
        _ => None,
    }
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TcmError::Other(e.into()))
}

#[async_trait]
impl JobRunStore for SqliteJobRunStore {
    async fn last_run(&self, job_name: &str) -> Result<Option<JobRun>> {
        let row = sqlx::query_as::<_, Row>(
            "SELECT job_name, started_at, ended_at, outcome, next_fire_at FROM job_runs WHERE job_name = ?",
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let Some(started_at) = row.started_at else { return Ok(None) };

        Ok(Some(JobRun {
            job_name: row.job_name,
            started_at: parse_dt(&started_at)?,
            ended_at: row.ended_at.map(|s| parse_dt(&s)).transpose()?,
            outcome: row.outcome.as_deref().and_then(outcome_from_str),
            next_fire_at: row.next_fire_at.map(|s| parse_dt(&s)).transpose()?,
        }))
    }

    async fn record_start(&self, job_name: &str, started_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_runs (job_name, started_at, ended_at, outcome) VALUES (?, ?, NULL, NULL)
             ON CONFLICT(job_name) DO UPDATE SET started_at = excluded.started_at, ended_at = NULL, outcome = NULL",
        )
        .bind(job_name)
        .bind(started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_end(
        &self,
        job_name: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        outcome: JobOutcome,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_runs (job_name, started_at, ended_at, outcome) VALUES (?, ?, ?, ?)
             ON CONFLICT(job_name) DO UPDATE SET started_at = excluded.started_at, ended_at = excluded.ended_at, outcome = excluded.outcome",
        )
        .bind(job_name)
        .bind(started_at.to_rfc3339())
        .bind(ended_at.to_rfc3339())
        .bind(outcome_to_str(outcome))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_next_fire(&self, job_name: &str, next_fire_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_runs (job_name, next_fire_at) VALUES (?, ?)
             ON CONFLICT(job_name) DO UPDATE SET next_fire_at = excluded.next_fire_at",
        )
        .bind(job_name)
        .bind(next_fire_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
