use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::ids::{ChannelId, UserId};
use crate::oncall::ScheduleSnapshot;

/// The full set of side effects one evaluation wants applied.
///
/// Applying an empty plan twice in a row is a no-op: the diff is taken
/// against the currently recorded on-call set, and notification cursors
/// only fire once per occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePlan {
    pub users_to_start: HashSet<UserId>,
    pub users_to_stop: HashSet<UserId>,
    pub notify_channels: HashSet<ChannelId>,
    /// Replacement configuration document, present only when a
    /// notification cursor moved.
    pub new_raw_data: Option<String>,
}

impl UpdatePlan {
    pub fn is_noop(&self) -> bool {
        self.users_to_start.is_empty()
            && self.users_to_stop.is_empty()
            && self.notify_channels.is_empty()
            && self.new_raw_data.is_none()
    }
}

impl ScheduleSnapshot {
    /// Computes the plan that converges recorded state to the resolved
    /// on-call set at `now`, including any notifications that came due.
    pub fn plan(&self, now: DateTime<Utc>) -> Result<UpdatePlan, DomainError> {
        let on_call = self.resolve_on_call(now);

        let mut plan = UpdatePlan {
            users_to_start: on_call
                .difference(&self.current_on_call)
                .cloned()
                .collect(),
            users_to_stop: self
                .current_on_call
                .difference(&on_call)
                .cloned()
                .collect(),
            ..Default::default()
        };
        let changed = !plan.users_to_start.is_empty() || !plan.users_to_stop.is_empty();

        let Some(data) = &self.data else {
            return Ok(plan);
        };

        let local = now.with_timezone(&self.time_zone);
        let mut data = data.clone();
        let mut cursor_moved = false;
        for rule in &mut data.v1.on_call_notification_rules {
            if rule.time.is_none() {
                // on-change rule
                if changed {
                    plan.notify_channels.insert(rule.channel_id.clone());
                }
                continue;
            }

            if matches!(rule.next_notification, Some(due) if due <= now) {
                plan.notify_channels.insert(rule.channel_id.clone());
            }

            // re-seed the cursor even when nothing fired, so a freshly
            // added rule gets a due time on the next pass
            let next = rule
                .next_occurrence(&local)
                .map(|t| t.with_timezone(&Utc));
            if rule.next_notification != next {
                rule.next_notification = next;
                cursor_moved = true;
            }
        }

        if cursor_moved {
            plan.new_raw_data = Some(data.apply_to_raw(self.raw_data.as_ref())?);
        }

        Ok(plan)
    }
}
