use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rota_core::ids::{NotificationId, OverrideId, RuleId, ScheduleId, UserId};
use rota_core::oncall::UpdatePlan;
use rota_core::schedule::{ScheduleRule, UserOverride};
use rota_core::time::{Clock, WeekdayFilter};
use rota_ports::error::PortError;
use rota_ports::outbound::ScheduleStore;
use rota_ports::types::{ScheduleJob, SnapshotRow};

use super::{map_write_err, SqliteDb};

/// The one place weekday columns become a filter. Columns are Sunday
/// first, matching the filter's internal order.
fn filter_from_row(days: [bool; 7]) -> WeekdayFilter {
    WeekdayFilter::new(days)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, PortError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PortError::Persistence(e.to_string()))
}

fn parse_clock(s: &str) -> Result<Clock, PortError> {
    s.parse()
        .map_err(|e: rota_core::error::DomainError| PortError::Persistence(e.to_string()))
}

type RuleRow = (
    String,
    String,
    bool,
    bool,
    bool,
    bool,
    bool,
    bool,
    bool,
    String,
    String,
);

type OverrideRow = (String, Option<String>, Option<String>, String, String);

#[async_trait]
impl ScheduleStore for SqliteDb {
    async fn list_schedules(&self) -> Result<Vec<ScheduleId>, PortError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM schedules")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for (id,) in rows {
            ids.push(
                ScheduleId::parse(&id).map_err(|e| PortError::Persistence(e.to_string()))?,
            );
        }
        Ok(ids)
    }

    async fn load_snapshot(
        &self,
        schedule_id: &ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<SnapshotRow, PortError> {
        let id = schedule_id.to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        let schedule: Option<(String,)> =
            sqlx::query_as("SELECT time_zone FROM schedules WHERE id = ?")
                .bind(&id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| PortError::Persistence(e.to_string()))?;
        let Some((time_zone,)) = schedule else {
            return Err(PortError::ScheduleDeleted);
        };

        let rule_rows: Vec<RuleRow> = sqlx::query_as(
            "SELECT id, user_id, sunday, monday, tuesday, wednesday, thursday, friday, saturday,
                    start_time, end_time
             FROM schedule_rules WHERE schedule_id = ? ORDER BY id",
        )
        .bind(&id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        let mut rules = Vec::with_capacity(rule_rows.len());
        for (rule_id, user_id, su, mo, tu, we, th, fr, sa, start, end) in rule_rows {
            rules.push(ScheduleRule {
                id: RuleId::parse(&rule_id).map_err(|e| PortError::Persistence(e.to_string()))?,
                schedule_id: schedule_id.clone(),
                user_id: UserId::parse(&user_id)
                    .map_err(|e| PortError::Persistence(e.to_string()))?,
                weekday_filter: filter_from_row([su, mo, tu, we, th, fr, sa]),
                start: parse_clock(&start)?,
                end: parse_clock(&end)?,
            });
        }

        // only overrides that can still affect anything; order is the
        // application order
        let override_rows: Vec<OverrideRow> = sqlx::query_as(
            "SELECT id, add_user_id, remove_user_id, start_time, end_time
             FROM user_overrides WHERE schedule_id = ? AND end_time > ? ORDER BY id",
        )
        .bind(&id)
        .bind(now.to_rfc3339())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        let mut overrides = Vec::with_capacity(override_rows.len());
        for (override_id, add, remove, start, end) in override_rows {
            overrides.push(UserOverride {
                id: OverrideId::parse(&override_id)
                    .map_err(|e| PortError::Persistence(e.to_string()))?,
                schedule_id: schedule_id.clone(),
                add_user_id: add
                    .as_deref()
                    .map(UserId::parse)
                    .transpose()
                    .map_err(|e| PortError::Persistence(e.to_string()))?,
                remove_user_id: remove
                    .as_deref()
                    .map(UserId::parse)
                    .transpose()
                    .map_err(|e| PortError::Persistence(e.to_string()))?,
                start: parse_ts(&start)?,
                end: parse_ts(&end)?,
            });
        }

        let raw_data: Option<(String,)> =
            sqlx::query_as("SELECT data FROM schedule_data WHERE schedule_id = ?")
                .bind(&id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| PortError::Persistence(e.to_string()))?;

        let on_call_rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM schedule_on_call_users
             WHERE schedule_id = ? AND end_time IS NULL",
        )
        .bind(&id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;

        let mut current_on_call = Vec::with_capacity(on_call_rows.len());
        for (user_id,) in on_call_rows {
            current_on_call
                .push(UserId::parse(&user_id).map_err(|e| PortError::Persistence(e.to_string()))?);
        }

        tx.commit()
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        Ok(SnapshotRow {
            schedule_id: schedule_id.clone(),
            time_zone,
            raw_data: raw_data.map(|(data,)| data),
            rules,
            overrides,
            current_on_call,
        })
    }

    async fn apply(
        &self,
        schedule_id: &ScheduleId,
        plan: &UpdatePlan,
        now: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<(), PortError> {
        let id = schedule_id.to_string();
        let now_text = now.to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM schedules WHERE id = ?")
            .bind(&id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| PortError::Persistence(e.to_string()))?;
        if exists.is_none() {
            return Err(PortError::ScheduleDeleted);
        }

        if let Some(data) = &plan.new_raw_data {
            sqlx::query(
                "INSERT INTO schedule_data (schedule_id, data) VALUES (?, ?)
                 ON CONFLICT(schedule_id) DO UPDATE SET data = excluded.data",
            )
            .bind(&id)
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(map_write_err)?;
        }

        for user_id in &plan.users_to_stop {
            sqlx::query(
                "UPDATE schedule_on_call_users SET end_time = ?
                 WHERE schedule_id = ? AND user_id = ? AND end_time IS NULL",
            )
            .bind(&now_text)
            .bind(&id)
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_write_err)?;
        }

        for user_id in &plan.users_to_start {
            sqlx::query(
                "INSERT INTO schedule_on_call_users (schedule_id, user_id, start_time)
                 VALUES (?, ?, ?)",
            )
            .bind(&id)
            .bind(user_id.to_string())
            .bind(&now_text)
            .execute(&mut *tx)
            .await
            .map_err(map_write_err)?;
        }

        for channel_id in &plan.notify_channels {
            sqlx::query(
                "INSERT INTO pending_notifications (id, schedule_id, channel_id, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(NotificationId::new().to_string())
            .bind(&id)
            .bind(channel_id.to_string())
            .bind(&now_text)
            .execute(&mut *tx)
            .await
            .map_err(map_write_err)?;
        }

        // the follow-up job rides the same transaction, so a crash can
        // never apply an update without scheduling the next one
        let job = ScheduleJob::new(schedule_id.clone(), next_run);
        sqlx::query(
            "INSERT INTO scheduler_jobs (id, schedule_id, unique_key, scheduled_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(unique_key) DO NOTHING",
        )
        .bind(job.id.to_string())
        .bind(&id)
        .bind(job.unique_key())
        .bind(job.scheduled_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(map_write_err)?;

        tx.commit().await.map_err(map_write_err)?;

        tracing::debug!(
            schedule_id = %schedule_id,
            starts = plan.users_to_start.len(),
            stops = plan.users_to_stop.len(),
            "applied schedule update"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rota_core::oncall::ScheduleSnapshot;
    use std::collections::HashSet;

    async fn db() -> SqliteDb {
        SqliteDb::new("sqlite::memory:").await.unwrap()
    }

    async fn seed_schedule(db: &SqliteDb, time_zone: &str) -> ScheduleId {
        let id = ScheduleId::new();
        sqlx::query("INSERT INTO schedules (id, time_zone) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(time_zone)
            .execute(db.pool())
            .await
            .unwrap();
        id
    }

    async fn seed_always_rule(db: &SqliteDb, schedule_id: &ScheduleId) -> UserId {
        let user = UserId::new();
        sqlx::query(
            "INSERT INTO schedule_rules
             (id, schedule_id, user_id, sunday, monday, tuesday, wednesday, thursday, friday, saturday, start_time, end_time)
             VALUES (?, ?, ?, 1, 1, 1, 1, 1, 1, 1, '00:00', '00:00')",
        )
        .bind(RuleId::new().to_string())
        .bind(schedule_id.to_string())
        .bind(user.to_string())
        .execute(db.pool())
        .await
        .unwrap();
        user
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn load_snapshot_decodes_rules_and_zone() {
        let db = db().await;
        let sched = seed_schedule(&db, "America/New_York").await;
        let user = seed_always_rule(&db, &sched).await;

        let row = db.load_snapshot(&sched, ts("2023-10-01T12:00:00Z")).await.unwrap();
        assert_eq!(row.time_zone, "America/New_York");
        assert_eq!(row.rules.len(), 1);
        assert_eq!(row.rules[0].user_id, user);
        assert!(row.rules[0].weekday_filter.is_always());
        assert!(row.current_on_call.is_empty());
        assert!(row.raw_data.is_none());
    }

    #[tokio::test]
    async fn load_snapshot_skips_expired_overrides() {
        let db = db().await;
        let sched = seed_schedule(&db, "UTC").await;

        for (start, end) in [
            ("2023-09-01T00:00:00+00:00", "2023-09-02T00:00:00+00:00"),
            ("2023-10-01T00:00:00+00:00", "2023-10-02T00:00:00+00:00"),
        ] {
            sqlx::query(
                "INSERT INTO user_overrides (id, schedule_id, add_user_id, start_time, end_time)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(OverrideId::new().to_string())
            .bind(sched.to_string())
            .bind(UserId::new().to_string())
            .bind(start)
            .bind(end)
            .execute(db.pool())
            .await
            .unwrap();
        }

        let row = db.load_snapshot(&sched, ts("2023-10-01T12:00:00Z")).await.unwrap();
        assert_eq!(row.overrides.len(), 1);
        assert_eq!(row.overrides[0].start, ts("2023-10-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn missing_schedule_reports_deleted() {
        let db = db().await;
        let err = db
            .load_snapshot(&ScheduleId::new(), ts("2023-10-01T12:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::ScheduleDeleted));
    }

    #[tokio::test]
    async fn apply_starts_and_stops_on_call_rows() {
        let db = db().await;
        let sched = seed_schedule(&db, "UTC").await;
        let now = ts("2023-10-01T12:00:00Z");
        let incoming = UserId::new();
        let outgoing = UserId::new();

        let plan = UpdatePlan {
            users_to_start: HashSet::from([outgoing.clone()]),
            ..Default::default()
        };
        db.apply(&sched, &plan, now, now + chrono::Duration::hours(1))
            .await
            .unwrap();

        let later = ts("2023-10-01T13:00:00Z");
        let plan = UpdatePlan {
            users_to_start: HashSet::from([incoming.clone()]),
            users_to_stop: HashSet::from([outgoing.clone()]),
            ..Default::default()
        };
        db.apply(&sched, &plan, later, later + chrono::Duration::hours(1))
            .await
            .unwrap();

        let row = db.load_snapshot(&sched, later).await.unwrap();
        assert_eq!(row.current_on_call, vec![incoming]);

        // the stopped row keeps its history with an end time
        let (ended,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM schedule_on_call_users WHERE user_id = ? AND end_time IS NOT NULL",
        )
        .bind(outgoing.to_string())
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn apply_records_notifications_and_data() {
        let db = db().await;
        let sched = seed_schedule(&db, "UTC").await;
        let now = ts("2023-10-01T12:00:00Z");
        let channel = rota_core::ids::ChannelId::new();

        let plan = UpdatePlan {
            notify_channels: HashSet::from([channel.clone()]),
            new_raw_data: Some(r#"{"v1":{}}"#.into()),
            ..Default::default()
        };
        db.apply(&sched, &plan, now, now + chrono::Duration::hours(1))
            .await
            .unwrap();

        let row = db.load_snapshot(&sched, now).await.unwrap();
        assert_eq!(row.raw_data.as_deref(), Some(r#"{"v1":{}}"#));

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pending_notifications WHERE channel_id = ?")
                .bind(channel.to_string())
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn apply_against_deleted_schedule_is_reported() {
        let db = db().await;
        let err = db
            .apply(
                &ScheduleId::new(),
                &UpdatePlan::default(),
                ts("2023-10-01T12:00:00Z"),
                ts("2023-10-01T13:00:00Z"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::ScheduleDeleted));
    }

    #[tokio::test]
    async fn repeated_apply_dedups_the_follow_up_job() {
        let db = db().await;
        let sched = seed_schedule(&db, "UTC").await;
        let now = ts("2023-10-01T12:00:00Z");
        let next = ts("2023-10-01T13:00:00Z");

        db.apply(&sched, &UpdatePlan::default(), now, next).await.unwrap();
        db.apply(&sched, &UpdatePlan::default(), now, next).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scheduler_jobs")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn end_to_end_pass_converges_and_is_idempotent() {
        let db = db().await;
        let sched = seed_schedule(&db, "UTC").await;
        let user = seed_always_rule(&db, &sched).await;
        let now = ts("2023-10-01T12:00:00Z");

        let row = db.load_snapshot(&sched, now).await.unwrap();
        let snapshot = ScheduleSnapshot::new(
            row.schedule_id,
            chrono_tz::UTC,
            row.raw_data.as_deref(),
            row.rules,
            row.overrides,
            row.current_on_call,
        )
        .unwrap();
        let plan = snapshot.plan(now).unwrap();
        assert_eq!(plan.users_to_start, HashSet::from([user.clone()]));
        db.apply(&sched, &plan, now, snapshot.next_wake(now)).await.unwrap();

        // second pass sees converged state and plans nothing
        let row = db.load_snapshot(&sched, now).await.unwrap();
        assert_eq!(row.current_on_call, vec![user]);
        let snapshot = ScheduleSnapshot::new(
            row.schedule_id,
            chrono_tz::UTC,
            row.raw_data.as_deref(),
            row.rules,
            row.overrides,
            row.current_on_call,
        )
        .unwrap();
        assert!(snapshot.plan(now).unwrap().is_noop());
    }
}
