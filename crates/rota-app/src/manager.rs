use std::sync::Mutex;

use chrono::{DateTime, Utc};

use rota_core::ids::ScheduleId;
use rota_core::oncall::ScheduleSnapshot;
use rota_ports::error::PortError;
use rota_ports::outbound::{JobQueue, ScheduleStore};
use rota_ports::types::ScheduleJob;

use crate::error::AppError;
use crate::tz_cache::TzCache;

/// Drives schedules toward their resolved on-call state.
///
/// Each `run` is one full evaluation: load a consistent snapshot,
/// compute the plan and the next wake time, then hand both to the store
/// for a single transactional apply. Running is idempotent, so crashing
/// between apply and acknowledgement only costs a redundant pass.
pub struct ScheduleManager<S, Q>
where
    S: ScheduleStore,
    Q: JobQueue,
{
    store: S,
    queue: Q,
    tz: Mutex<TzCache>,
}

impl<S, Q> ScheduleManager<S, Q>
where
    S: ScheduleStore,
    Q: JobQueue,
{
    pub fn new(store: S, queue: Q) -> Self {
        Self {
            store,
            queue,
            tz: Mutex::new(TzCache::default()),
        }
    }

    /// Enqueues an immediate evaluation for every known schedule.
    /// Called at startup; minute-bucket dedup makes repeats harmless.
    pub async fn seed_all(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let schedules = self.store.list_schedules().await?;
        let mut count = 0;
        for schedule_id in schedules {
            match self.queue.enqueue(ScheduleJob::new(schedule_id, now)).await {
                Ok(()) => count += 1,
                // deleted between the listing and the enqueue
                Err(PortError::ScheduleDeleted) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(count, "seeded schedule evaluations");
        Ok(count)
    }

    /// Evaluates one schedule at `now`.
    ///
    /// A schedule deleted before the load, or between the load and the
    /// apply, is not an error; the evaluation quietly becomes a no-op.
    pub async fn run(&self, schedule_id: &ScheduleId, now: DateTime<Utc>) -> Result<(), AppError> {
        let row = match self.store.load_snapshot(schedule_id, now).await {
            Ok(row) => row,
            Err(PortError::ScheduleDeleted) => {
                tracing::debug!(%schedule_id, "schedule deleted before evaluation");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let tz = {
            let mut cache = match self.tz.lock() {
                Ok(cache) => cache,
                Err(poisoned) => poisoned.into_inner(),
            };
            cache.resolve(&row.time_zone)?
        };

        let snapshot = ScheduleSnapshot::new(
            row.schedule_id,
            tz,
            row.raw_data.as_deref(),
            row.rules,
            row.overrides,
            row.current_on_call,
        )?;

        let plan = snapshot.plan(now)?;
        let next_run = snapshot.next_wake(now);

        tracing::debug!(
            %schedule_id,
            starts = plan.users_to_start.len(),
            stops = plan.users_to_stop.len(),
            notifications = plan.notify_channels.len(),
            %next_run,
            "applying schedule update"
        );

        match self.store.apply(schedule_id, &plan, now, next_run).await {
            Ok(()) => Ok(()),
            Err(PortError::ScheduleDeleted) => {
                tracing::debug!(%schedule_id, "schedule deleted during evaluation");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
