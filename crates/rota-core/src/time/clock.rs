use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// Wall-clock time of day, stored as whole minutes since midnight.
///
/// A `Clock` is purely nominal; mapping it to an absolute instant goes
/// through [`Clock::first_of_day`] / [`Clock::last_of_day`], which account
/// for days that are 23 or 25 hours long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Clock(i32);

/// A zone-offset change within the 24 hours following some midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstChange {
    /// Elapsed minutes after midnight at which the new offset takes effect.
    pub at: Clock,
    /// Offset delta in minutes; positive springs forward.
    pub change: i32,
}

fn offset_minutes(t: &DateTime<Tz>) -> i32 {
    t.offset().fix().local_minus_utc() / 60
}

/// Detects a zone-offset change within the 24 hours after `t`.
///
/// Most days have none, which lets callers skip DST correction entirely.
/// When a change exists, a binary search pins down the transition minute.
pub fn dst_change(t: &DateTime<Tz>) -> Option<DstChange> {
    let old_offset = offset_minutes(t);
    let new_offset = offset_minutes(&(*t + Duration::hours(24)));
    if old_offset == new_offset {
        return None;
    }

    let (mut lo, mut hi) = (0i32, 24 * 60);
    while lo < hi {
        let mid = (lo + hi) / 2;
        if offset_minutes(&(*t + Duration::minutes(mid as i64))) == new_offset {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    Some(DstChange {
        at: Clock(lo),
        change: new_offset - old_offset,
    })
}

/// Midnight of `date` in `tz`. If the transition skips midnight itself,
/// the first representable instant after it is used.
pub(crate) fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    let naive = date.and_time(chrono::NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(t) => t,
        chrono::LocalResult::Ambiguous(earliest, _) => earliest,
        chrono::LocalResult::None => {
            for extra in 1..=180 {
                let shifted = naive + Duration::minutes(extra);
                if let Some(t) = tz.from_local_datetime(&shifted).earliest() {
                    return t;
                }
            }
            tz.from_utc_datetime(&naive)
        }
    }
}

pub(crate) fn midnight_of(t: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(t.date_naive(), t.timezone())
}

pub(crate) fn next_day_midnight(t: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(t.date_naive() + Duration::days(1), t.timezone())
}

fn minutes(m: i32) -> Duration {
    Duration::minutes(m as i64)
}

impl Clock {
    pub fn new(hour: i32, minute: i32) -> Self {
        Clock(hour * 60 + minute)
    }

    pub fn hour(&self) -> i32 {
        self.0 / 60
    }

    pub fn minute(&self) -> i32 {
        self.0 % 60
    }

    /// Total minutes since midnight.
    pub fn minutes(&self) -> i32 {
        self.0
    }

    /// The first instant on `day` whose wall-clock time matches, or the
    /// first instant after if the time was skipped by a transition.
    ///
    /// On fall-back days a repeated clock time resolves to its earliest
    /// occurrence.
    pub fn first_of_day(&self, day: &DateTime<Tz>) -> DateTime<Tz> {
        let midnight = midnight_of(day);
        match dst_change(&midnight) {
            None => midnight + minutes(self.0),
            Some(d) if *self < d.at => midnight + minutes(self.0),
            Some(d) if d.change > 0 => {
                if self.0 < d.at.0 + d.change {
                    // inside the skipped span, e.g. 02:30 when 02:00 jumps
                    // to 03:00; resolve to the transition instant
                    midnight + minutes(d.at.0)
                } else {
                    midnight + minutes(self.0 - d.change)
                }
            }
            // fell back, and the target is past the transition: the clock
            // repeated earlier, so extra elapsed time is needed
            Some(d) => midnight + minutes(self.0 - d.change),
        }
    }

    /// The last instant on `day` whose wall-clock time matches, or the
    /// first instant after if the time was skipped.
    ///
    /// On fall-back days a repeated clock time resolves to its latest
    /// occurrence.
    pub fn last_of_day(&self, day: &DateTime<Tz>) -> DateTime<Tz> {
        let midnight = midnight_of(day);
        match dst_change(&midnight) {
            None => midnight + minutes(self.0),
            Some(d) if d.change > 0 => {
                if *self < d.at {
                    midnight + minutes(self.0)
                } else if self.0 < d.at.0 + d.change {
                    midnight + minutes(d.at.0)
                } else {
                    midnight + minutes(self.0 - d.change)
                }
            }
            Some(d) => {
                // clocks at or past the repeat point occur twice; take the
                // second pass
                if self.0 < d.at.0 + d.change {
                    midnight + minutes(self.0)
                } else {
                    midnight + minutes(self.0 - d.change)
                }
            }
        }
    }

    /// The next strictly-future instant at which the wall clock reads
    /// this value, crossing at most one day boundary.
    pub fn next_clock(&self, from: &DateTime<Tz>) -> DateTime<Tz> {
        let today = self.first_of_day(from);
        if today > *from {
            return today;
        }
        self.first_of_day(&next_day_midnight(from))
    }
}

impl FromStr for Clock {
    type Err = DomainError;

    /// Parses `HH:MM` or `HH:MM:SS`; the seconds are validated, then
    /// truncated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(DomainError::InvalidClockFormat(s.into()));
        }

        let hour: i32 = parts[0]
            .parse()
            .map_err(|_| DomainError::InvalidClockFormat(s.into()))?;
        let minute: i32 = parts[1]
            .parse()
            .map_err(|_| DomainError::InvalidClockFormat(s.into()))?;
        if parts.len() == 3 {
            let seconds: f64 = parts[2]
                .parse()
                .map_err(|_| DomainError::InvalidClockFormat(s.into()))?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(DomainError::ClockOutOfRange(s.into()));
            }
        }

        if !(0..24).contains(&hour) || !(0..60).contains(&minute) {
            return Err(DomainError::ClockOutOfRange(s.into()));
        }

        Ok(Clock::new(hour, minute))
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for Clock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Clock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_york() -> Tz {
        "America/New_York".parse().unwrap()
    }

    fn ny(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        new_york()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .earliest()
            .unwrap()
    }

    fn utc_instant(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parse_accepts_both_formats() {
        assert_eq!("08:30".parse::<Clock>().unwrap(), Clock::new(8, 30));
        assert_eq!("8:05".parse::<Clock>().unwrap(), Clock::new(8, 5));
        assert_eq!("23:59:59".parse::<Clock>().unwrap(), Clock::new(23, 59));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for s in ["", "8", "eight:30", "08:30:15:00", "08-30"] {
            assert!(matches!(
                s.parse::<Clock>(),
                Err(DomainError::InvalidClockFormat(_))
            ));
        }
    }

    #[test]
    fn parse_rejects_out_of_range_values() {
        for s in ["24:00", "12:60", "-1:00", "12:30:61"] {
            assert!(matches!(
                s.parse::<Clock>(),
                Err(DomainError::ClockOutOfRange(_))
            ));
        }
    }

    #[test]
    fn display_round_trips() {
        let c = Clock::new(9, 5);
        assert_eq!(c.to_string(), "09:05");
        assert_eq!(c.to_string().parse::<Clock>().unwrap(), c);
    }

    #[test]
    fn serde_uses_display_form() {
        let json = serde_json::to_string(&Clock::new(17, 30)).unwrap();
        assert_eq!(json, "\"17:30\"");
        let back: Clock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Clock::new(17, 30));
    }

    #[test]
    fn dst_change_detects_spring_forward() {
        // 2023-03-12: 02:00 EST jumps to 03:00 EDT
        let midnight = ny(2023, 3, 12, 0, 0);
        let d = dst_change(&midnight).unwrap();
        assert_eq!(d.at, Clock::new(2, 0));
        assert_eq!(d.change, 60);
    }

    #[test]
    fn dst_change_detects_fall_back() {
        // 2023-11-05: 02:00 EDT falls back to 01:00 EST
        let midnight = ny(2023, 11, 5, 0, 0);
        let d = dst_change(&midnight).unwrap();
        assert_eq!(d.at, Clock::new(2, 0));
        assert_eq!(d.change, -60);
    }

    #[test]
    fn dst_change_absent_on_ordinary_days() {
        assert!(dst_change(&ny(2023, 6, 15, 0, 0)).is_none());
    }

    #[test]
    fn first_of_day_without_transition() {
        let t = Clock::new(9, 30).first_of_day(&ny(2023, 6, 15, 4, 0));
        assert_eq!(t, ny(2023, 6, 15, 9, 30));
    }

    #[test]
    fn skipped_time_resolves_to_transition_instant() {
        // 02:30 does not exist on 2023-03-12; both mappings land on 03:00 EDT
        let day = ny(2023, 3, 12, 0, 0);
        let expect = utc_instant("2023-03-12T07:00:00Z");
        assert_eq!(
            Clock::new(2, 30).first_of_day(&day).with_timezone(&Utc),
            expect
        );
        assert_eq!(
            Clock::new(2, 30).last_of_day(&day).with_timezone(&Utc),
            expect
        );
    }

    #[test]
    fn times_after_spring_forward_lose_the_skipped_hour() {
        let day = ny(2023, 3, 12, 0, 0);
        // wall 04:00 EDT is only 3 elapsed hours after midnight
        assert_eq!(
            Clock::new(4, 0).first_of_day(&day).with_timezone(&Utc),
            utc_instant("2023-03-12T08:00:00Z")
        );
    }

    #[test]
    fn repeated_time_resolves_first_and_last() {
        // 01:30 occurs twice on 2023-11-05: 05:30Z (EDT) and 06:30Z (EST)
        let day = ny(2023, 11, 5, 0, 0);
        assert_eq!(
            Clock::new(1, 30).first_of_day(&day).with_timezone(&Utc),
            utc_instant("2023-11-05T05:30:00Z")
        );
        assert_eq!(
            Clock::new(1, 30).last_of_day(&day).with_timezone(&Utc),
            utc_instant("2023-11-05T06:30:00Z")
        );
    }

    #[test]
    fn times_after_fall_back_gain_the_repeated_hour() {
        // wall 02:30 EST occurs once, 3.5 elapsed hours after midnight EDT
        let day = ny(2023, 11, 5, 0, 0);
        let expect = utc_instant("2023-11-05T07:30:00Z");
        assert_eq!(
            Clock::new(2, 30).first_of_day(&day).with_timezone(&Utc),
            expect
        );
        assert_eq!(
            Clock::new(2, 30).last_of_day(&day).with_timezone(&Utc),
            expect
        );
    }

    #[test]
    fn next_clock_is_strictly_future() {
        let from = ny(2023, 6, 15, 9, 0);
        assert_eq!(
            Clock::new(9, 0).next_clock(&from),
            ny(2023, 6, 16, 9, 0),
            "an exact match must advance a full day"
        );
        assert_eq!(Clock::new(9, 1).next_clock(&from), ny(2023, 6, 15, 9, 1));
    }

    #[test]
    fn next_clock_crosses_spring_forward() {
        let from = ny(2023, 3, 11, 22, 0);
        assert_eq!(
            Clock::new(2, 30).next_clock(&from).with_timezone(&Utc),
            utc_instant("2023-03-12T07:00:00Z")
        );
    }

    #[test]
    fn local_midnight_handles_skipped_midnight() {
        // Santiago springs forward at midnight; 2022-09-11 00:00 does not exist
        let santiago: Tz = "America/Santiago".parse().unwrap();
        let t = local_midnight(NaiveDate::from_ymd_opt(2022, 9, 11).unwrap(), santiago);
        assert_eq!(t.with_timezone(&Utc), utc_instant("2022-09-11T04:00:00Z"));
    }
}
