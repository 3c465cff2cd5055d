use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// One user's slice of a temporary schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedShift {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub user_id: UserId,
}

/// A time-bounded full replacement of normal rule/override resolution.
///
/// While active, the on-call set is exactly the users whose shifts cover
/// the instant; rules and overrides are ignored entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporarySchedule {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub shifts: Vec<FixedShift>,
}

impl FixedShift {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

impl TemporarySchedule {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    /// Users whose shifts cover `at`. An active temporary schedule with no
    /// covering shift yields an empty set, which is a valid answer.
    pub fn on_call_at(&self, at: DateTime<Utc>) -> HashSet<UserId> {
        self.shifts
            .iter()
            .filter(|s| s.covers(at))
            .map(|s| s.user_id.clone())
            .collect()
    }
}
