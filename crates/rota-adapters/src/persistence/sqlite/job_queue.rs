use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rota_core::ids::{JobId, ScheduleId};
use rota_ports::error::PortError;
use rota_ports::outbound::JobQueue;
use rota_ports::types::ScheduleJob;

use super::{map_write_err, SqliteDb};

/// How long a claimed job may stay `running` before another worker may
/// take it over. Evaluations are idempotent, so a double run after a
/// crashed worker is safe; a stranded row is not.
const CLAIM_LEASE: chrono::Duration = chrono::Duration::minutes(5);

fn parse_ts(s: &str) -> Result<DateTime<Utc>, PortError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PortError::Persistence(e.to_string()))
}

#[async_trait]
impl JobQueue for SqliteDb {
    async fn enqueue(&self, job: ScheduleJob) -> Result<(), PortError> {
        sqlx::query(
            "INSERT INTO scheduler_jobs (id, schedule_id, unique_key, scheduled_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(unique_key) DO NOTHING",
        )
        .bind(job.id.to_string())
        .bind(job.schedule_id.to_string())
        .bind(job.unique_key())
        .bind(job.scheduled_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_write_err)?;
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleJob>, PortError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        // reclaim rows whose worker died between claim and ack
        let released = sqlx::query(
            "UPDATE scheduler_jobs SET status = 'pending', claimed_at = NULL
             WHERE status = 'running' AND claimed_at <= ?",
        )
        .bind((now - CLAIM_LEASE).to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;
        if released.rows_affected() > 0 {
            tracing::warn!(count = released.rows_affected(), "released expired job claims");
        }

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT id, schedule_id, scheduled_at FROM scheduler_jobs
             WHERE status = 'pending' AND scheduled_at <= ?
             ORDER BY scheduled_at ASC",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (id, schedule_id, scheduled_at) in rows {
            sqlx::query("UPDATE scheduler_jobs SET status = 'running', claimed_at = ? WHERE id = ?")
                .bind(now.to_rfc3339())
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(|e| PortError::Persistence(e.to_string()))?;

            jobs.push(ScheduleJob {
                id: JobId::parse(&id).map_err(|e| PortError::Persistence(e.to_string()))?,
                schedule_id: ScheduleId::parse(&schedule_id)
                    .map_err(|e| PortError::Persistence(e.to_string()))?,
                scheduled_at: parse_ts(&scheduled_at)?,
            });
        }

        tx.commit()
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;
        Ok(jobs)
    }

    async fn mark_done(&self, id: &JobId) -> Result<(), PortError> {
        sqlx::query("DELETE FROM scheduler_jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(&self, id: &JobId, retry_at: DateTime<Utc>) -> Result<(), PortError> {
        sqlx::query(
            "UPDATE scheduler_jobs
             SET status = 'pending', scheduled_at = ?, claimed_at = NULL
             WHERE id = ?",
        )
        .bind(retry_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        tracing::warn!(job_id = %id, retry_at = %retry_at, "schedule job failed, retrying");
        Ok(())
    }
}
