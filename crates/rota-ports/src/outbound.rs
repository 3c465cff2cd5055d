use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rota_core::ids::ScheduleId;
use rota_core::oncall::UpdatePlan;

use crate::error::PortError;
use crate::types::{ScheduleJob, SnapshotRow};

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list_schedules(&self) -> Result<Vec<ScheduleId>, PortError>;

    /// Loads everything one evaluation needs in a single consistent read.
    /// `Err(ScheduleDeleted)` when the schedule row no longer exists.
    async fn load_snapshot(
        &self,
        schedule_id: &ScheduleId,
        now: DateTime<Utc>,
    ) -> Result<SnapshotRow, PortError>;

    /// Applies a plan and enqueues the follow-up job in one transaction.
    /// Either everything lands or nothing does; a deleted schedule
    /// surfaces as `Err(ScheduleDeleted)` with no partial writes.
    async fn apply(
        &self,
        schedule_id: &ScheduleId,
        plan: &UpdatePlan,
        now: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<(), PortError>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ScheduleJob) -> Result<(), PortError>;
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleJob>, PortError>;
    async fn mark_done(&self, id: &rota_core::ids::JobId) -> Result<(), PortError>;
    async fn mark_failed(
        &self,
        id: &rota_core::ids::JobId,
        retry_at: DateTime<Utc>,
    ) -> Result<(), PortError>;
}
