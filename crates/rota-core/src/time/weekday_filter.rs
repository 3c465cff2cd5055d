use chrono::{DateTime, Datelike, Duration, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::clock::local_midnight;

/// Seven active/inactive flags, Sunday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WeekdayFilter([bool; 7]);

const NEVER: WeekdayFilter = WeekdayFilter([false; 7]);
const EVERY_DAY: WeekdayFilter = WeekdayFilter([true; 7]);

fn next_weekday(t: &DateTime<Tz>, day_idx: usize) -> DateTime<Tz> {
    let current = t.weekday().num_days_from_sunday() as i64;
    let mut ahead = (day_idx as i64 - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    local_midnight(t.date_naive() + Duration::days(ahead), t.timezone())
}

impl WeekdayFilter {
    pub fn new(days: [bool; 7]) -> Self {
        WeekdayFilter(days)
    }

    pub fn every_day() -> Self {
        EVERY_DAY
    }

    pub fn never() -> Self {
        NEVER
    }

    /// O(1) sentinel check; callers use it to skip next-transition searches.
    pub fn is_always(&self) -> bool {
        *self == EVERY_DAY
    }

    pub fn is_never(&self) -> bool {
        *self == NEVER
    }

    pub fn day(&self, d: Weekday) -> bool {
        self.0[d.num_days_from_sunday() as usize]
    }

    pub fn set_day(&mut self, d: Weekday, enabled: bool) {
        self.0[d.num_days_from_sunday() as usize] = enabled;
    }

    /// Midnight of the next active day strictly after `t`, or `None` if no
    /// day is active.
    pub fn next_active(&self, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let w = t.weekday().num_days_from_sunday() as usize;
        for i in 0..7 {
            let day = (w + i + 1) % 7;
            if self.0[day] {
                return Some(next_weekday(t, day));
            }
        }
        None
    }

    /// Midnight of the next inactive day strictly after `t`, or `None` if
    /// every day is active.
    pub fn next_inactive(&self, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let w = t.weekday().num_days_from_sunday() as usize;
        for i in 0..7 {
            let day = (w + i + 1) % 7;
            if !self.0[day] {
                return Some(next_weekday(t, day));
            }
        }
        None
    }

    /// Midnight of the first day of the contiguous active run containing
    /// `t`'s day. If `t`'s day is inactive, falls forward to the next
    /// active day instead.
    pub fn start_time(&self, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let w = t.weekday().num_days_from_sunday() as i64;
        let mut days = 0i64;
        for i in 0..7 {
            let day = ((7 + w - i) % 7) as usize;
            if !self.0[day] {
                break;
            }
            days += 1;
        }
        if days == 0 {
            return self.next_active(t);
        }
        Some(local_midnight(
            t.date_naive() - Duration::days(days - 1),
            t.timezone(),
        ))
    }

    /// Days from `d` (inclusive) until a day whose flag equals `enabled`;
    /// -1 if the filter is uniformly the opposite.
    pub fn days_until(&self, d: Weekday, enabled: bool) -> i32 {
        if enabled && self.is_never() {
            return -1;
        }
        if !enabled && self.is_always() {
            return -1;
        }
        let start = d.num_days_from_sunday() as usize;
        if let Some(offset) = (start..7).position(|i| self.0[i] == enabled) {
            return offset as i32;
        }
        match (0..7).find(|&i| self.0[i] == enabled) {
            Some(idx) => (7 - start + idx) as i32,
            None => -1,
        }
    }

    /// Days since the most recent day (counting backward from `d`,
    /// inclusive) whose flag equals `enabled`; -1 if the filter is
    /// uniformly the opposite.
    pub fn days_since(&self, d: Weekday, enabled: bool) -> i32 {
        if enabled && self.is_never() {
            return -1;
        }
        if !enabled && self.is_always() {
            return -1;
        }
        let start = d.num_days_from_sunday() as usize;
        if let Some(idx) = (0..=start).rev().find(|&i| self.0[i] == enabled) {
            return (start - idx) as i32;
        }
        match ((start + 1)..7).rev().find(|&i| self.0[i] == enabled) {
            Some(idx) => (start + 7 - idx) as i32,
            None => -1,
        }
    }
}
