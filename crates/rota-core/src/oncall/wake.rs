use chrono::{DateTime, Duration, Utc};

use crate::oncall::ScheduleSnapshot;

/// Upper bound on how long a schedule may sleep between evaluations.
/// A quiet week still gets re-checked, so drifted state self-heals.
const MAX_SLEEP: Duration = Duration::days(7);

impl ScheduleSnapshot {
    /// The earliest strictly-future instant at which the on-call set or a
    /// notification could change, capped at `now` plus seven days.
    ///
    /// Waking early is harmless (the evaluation is idempotent); waking
    /// late would miss a boundary, so every candidate source of change
    /// contributes here.
    pub fn next_wake(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut best = now + MAX_SLEEP;
        let mut consider = |t: DateTime<Utc>| {
            if t > now && t < best {
                best = t;
            }
        };

        let local = now.with_timezone(&self.time_zone);
        for rule in &self.rules {
            if let Some(t) = rule.start_time(&local) {
                consider(t.with_timezone(&Utc));
            }
            if let Some(t) = rule.end_time(&local) {
                consider(t.with_timezone(&Utc));
            }
        }

        for o in &self.overrides {
            consider(o.start);
            consider(o.end);
        }

        if let Some(data) = &self.data {
            for temp in &data.v1.temporary_schedules {
                consider(temp.start);
                consider(temp.end);
                for shift in &temp.shifts {
                    consider(shift.start);
                    consider(shift.end);
                }
            }
            for rule in &data.v1.on_call_notification_rules {
                if let Some(due) = rule.next_notification {
                    consider(due);
                }
                if let Some(next) = rule.next_occurrence(&local) {
                    consider(next.with_timezone(&Utc));
                }
                // both of today's mappings of the slot; they differ when a
                // transition repeats the wall-clock time
                if let Some(time) = rule.time {
                    consider(time.first_of_day(&local).with_timezone(&Utc));
                    consider(time.last_of_day(&local).with_timezone(&Utc));
                }
            }
        }

        best
    }
}
