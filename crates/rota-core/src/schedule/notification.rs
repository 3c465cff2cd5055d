use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::ids::ChannelId;
use crate::time::{Clock, WeekdayFilter};

/// When to notify a channel about on-call state.
///
/// With `time` unset the rule fires whenever the resolved on-call set
/// changes. With `time` set it fires at that wall-clock time on filtered
/// days, tracked by the persisted `next_notification` cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnCallNotificationRule {
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Clock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday_filter: Option<WeekdayFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_notification: Option<DateTime<Utc>>,
}

impl OnCallNotificationRule {
    pub fn on_change(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            time: None,
            weekday_filter: None,
            next_notification: None,
        }
    }

    pub fn at_time(channel_id: ChannelId, time: Clock, filter: Option<WeekdayFilter>) -> Self {
        Self {
            channel_id,
            time: Some(time),
            weekday_filter: filter,
            next_notification: None,
        }
    }

    /// The next occurrence strictly after `now`, in `now`'s zone.
    ///
    /// `None` for on-change rules and for a never-filter (permanently
    /// unset). An unset or always filter advances by at most one day.
    pub fn next_occurrence(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let time = self.time?;

        let filter = match &self.weekday_filter {
            None => return Some(time.next_clock(now)),
            Some(f) if f.is_always() => return Some(time.next_clock(now)),
            Some(f) if f.is_never() => return None,
            Some(f) => f,
        };

        let mut next = if filter.day(now.weekday()) {
            time.first_of_day(now)
        } else {
            time.first_of_day(&filter.next_active(now)?)
        };
        if next <= *now {
            next = time.first_of_day(&filter.next_active(&next)?);
        }
        Some(next)
    }
}
