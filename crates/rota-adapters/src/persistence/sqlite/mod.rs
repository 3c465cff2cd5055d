mod job_queue;
mod schedule_store;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use rota_ports::error::PortError;

#[derive(Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
}

/// SQLite reports a violated reference as a plain database error; it is
/// how a concurrently deleted schedule shows up mid-transaction.
pub(crate) fn map_write_err(e: sqlx::Error) -> PortError {
    if e.to_string().contains("FOREIGN KEY constraint failed") {
        return PortError::ScheduleDeleted;
    }
    PortError::Persistence(e.to_string())
}

impl SqliteDb {
    pub async fn new(url: &str) -> Result<Self, PortError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| PortError::Connection(e.to_string()))?
            .create_if_missing(true)
            // cascade deletes and deleted-schedule detection both rely
            // on enforced references
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| PortError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), PortError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                time_zone TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schedule_rules (
                id TEXT PRIMARY KEY,
                schedule_id TEXT NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                sunday INTEGER NOT NULL DEFAULT 0,
                monday INTEGER NOT NULL DEFAULT 0,
                tuesday INTEGER NOT NULL DEFAULT 0,
                wednesday INTEGER NOT NULL DEFAULT 0,
                thursday INTEGER NOT NULL DEFAULT 0,
                friday INTEGER NOT NULL DEFAULT 0,
                saturday INTEGER NOT NULL DEFAULT 0,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_schedule_rules_schedule
             ON schedule_rules(schedule_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_overrides (
                id TEXT PRIMARY KEY,
                schedule_id TEXT NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
                add_user_id TEXT,
                remove_user_id TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_user_overrides_schedule
             ON user_overrides(schedule_id, end_time)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schedule_data (
                schedule_id TEXT PRIMARY KEY REFERENCES schedules(id) ON DELETE CASCADE,
                data TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schedule_on_call_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schedule_id TEXT NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_on_call_active
             ON schedule_on_call_users(schedule_id, user_id)
             WHERE end_time IS NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pending_notifications (
                id TEXT PRIMARY KEY,
                schedule_id TEXT NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
                channel_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scheduler_jobs (
                id TEXT PRIMARY KEY,
                schedule_id TEXT NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
                unique_key TEXT NOT NULL UNIQUE,
                scheduled_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                claimed_at TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scheduler_jobs_due
             ON scheduler_jobs(status, scheduled_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
