use chrono::{DateTime, Utc};

use rota_core::ids::{JobId, ScheduleId};

/// Everything the store loaded for one schedule, still in wire form.
/// Time zone and weekday columns are decoded by the caller.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub schedule_id: ScheduleId,
    pub time_zone: String,
    pub raw_data: Option<String>,
    pub rules: Vec<rota_core::schedule::ScheduleRule>,
    pub overrides: Vec<rota_core::schedule::UserOverride>,
    pub current_on_call: Vec<rota_core::ids::UserId>,
}

/// One scheduled evaluation of a schedule.
#[derive(Debug, Clone)]
pub struct ScheduleJob {
    pub id: JobId,
    pub schedule_id: ScheduleId,
    pub scheduled_at: DateTime<Utc>,
}

impl ScheduleJob {
    pub fn new(schedule_id: ScheduleId, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            schedule_id,
            scheduled_at,
        }
    }

    /// Deduplication key: one job per schedule per minute bucket. Two
    /// enqueues that land in the same minute collapse to a single run.
    pub fn unique_key(&self) -> String {
        format!("{}:{}", self.schedule_id, self.scheduled_at.timestamp() / 60)
    }
}
