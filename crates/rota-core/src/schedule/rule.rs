use chrono::{DateTime, Datelike, Duration, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::ids::{RuleId, ScheduleId, UserId};
use crate::time::{Clock, WeekdayFilter};

/// A recurring on-call assignment window: active on the filtered weekdays
/// between `start` and `end` wall-clock times.
///
/// `start > end` wraps past midnight (yesterday's shift may still be
/// active). `start == end` is a full-day shift on enabled days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: RuleId,
    pub schedule_id: ScheduleId,
    pub user_id: UserId,
    pub weekday_filter: WeekdayFilter,
    pub start: Clock,
    pub end: Clock,
}

fn truncate_to_minute(t: &DateTime<Tz>) -> DateTime<Tz> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(*t)
}

impl ScheduleRule {
    pub fn new(
        schedule_id: ScheduleId,
        user_id: UserId,
        weekday_filter: WeekdayFilter,
        start: Clock,
        end: Clock,
    ) -> Self {
        Self {
            id: RuleId::new(),
            schedule_id,
            user_id,
            weekday_filter,
            start,
            end,
        }
    }

    pub fn never_active(&self) -> bool {
        self.weekday_filter.is_never()
    }

    pub fn always_active(&self) -> bool {
        self.weekday_filter.is_always() && self.start == self.end
    }

    /// The time the current or next shift starts. If the rule is active at
    /// `t`, the returned instant is in the past.
    ///
    /// `None` for rules that are never or always active.
    pub fn start_time(&self, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        if self.never_active() || self.always_active() {
            return None;
        }
        let t = truncate_to_minute(t);

        let today_enabled = self.weekday_filter.day(t.weekday());

        if today_enabled && self.start == self.end {
            // full-day shift, began at the start of the contiguous run
            let run_start = self.weekday_filter.start_time(&t)?;
            return Some(self.start.first_of_day(&run_start));
        }

        if self.start < self.end {
            if !today_enabled {
                return Some(self.start.first_of_day(&self.weekday_filter.next_active(&t)?));
            }

            // same-day shift; check whether it already ended
            let end = self.end.last_of_day(&t);
            if t < end {
                return Some(self.start.first_of_day(&t));
            }
            return Some(self.start.first_of_day(&self.weekday_filter.next_active(&t)?));
        }

        // overnight shift
        let end = self.end.last_of_day(&t);
        if self.weekday_filter.day(t.weekday().pred()) && t < end {
            // yesterday's shift is still running
            return Some(self.start.first_of_day(&(t - Duration::days(1))));
        }

        if today_enabled {
            return Some(self.start.first_of_day(&t));
        }

        Some(self.start.first_of_day(&self.weekday_filter.next_active(&t)?))
    }

    /// The time the shift that starts at [`Self::start_time`] ends.
    ///
    /// `None` for rules that are never or always active.
    pub fn end_time(&self, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let start = self.start_time(t)?;

        if self.start < self.end {
            return Some(self.end.last_of_day(&start));
        }
        if self.start > self.end {
            // overnight, always the day after the start
            return Some(self.end.last_of_day(&(start + Duration::days(1))));
        }

        // full-day shift ends at the next inactive day
        Some(self.end.last_of_day(&self.weekday_filter.next_inactive(&start)?))
    }

    /// Whether the rule is active at `t`, evaluated in `t`'s zone.
    pub fn is_active(&self, t: &DateTime<Tz>) -> bool {
        if self.never_active() {
            return false;
        }
        if self.always_active() {
            return true;
        }
        match self.start_time(t) {
            Some(start) => start <= *t,
            None => false,
        }
    }
}
