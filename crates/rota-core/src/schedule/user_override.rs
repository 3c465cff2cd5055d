use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OverrideId, ScheduleId, UserId};

/// A time-bounded exception to normal rule resolution.
///
/// The add/remove pair encodes three forms: add-only, remove-only, and
/// replace (both set). Replace only applies when the removed user is
/// actually on call, mirroring "swap my shift" semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOverride {
    pub id: OverrideId,
    pub schedule_id: ScheduleId,
    pub add_user_id: Option<UserId>,
    pub remove_user_id: Option<UserId>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideKind<'a> {
    Add(&'a UserId),
    Remove(&'a UserId),
    Replace {
        remove: &'a UserId,
        add: &'a UserId,
    },
}

impl UserOverride {
    pub fn add(
        schedule_id: ScheduleId,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OverrideId::new(),
            schedule_id,
            add_user_id: Some(user_id),
            remove_user_id: None,
            start,
            end,
        }
    }

    pub fn remove(
        schedule_id: ScheduleId,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OverrideId::new(),
            schedule_id,
            add_user_id: None,
            remove_user_id: Some(user_id),
            start,
            end,
        }
    }

    pub fn replace(
        schedule_id: ScheduleId,
        remove: UserId,
        add: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OverrideId::new(),
            schedule_id,
            add_user_id: Some(add),
            remove_user_id: Some(remove),
            start,
            end,
        }
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    /// `None` when both user fields are unset (an inert row).
    pub fn kind(&self) -> Option<OverrideKind<'_>> {
        match (&self.add_user_id, &self.remove_user_id) {
            (Some(add), None) => Some(OverrideKind::Add(add)),
            (None, Some(remove)) => Some(OverrideKind::Remove(remove)),
            (Some(add), Some(remove)) => Some(OverrideKind::Replace { remove, add }),
            (None, None) => None,
        }
    }
}
