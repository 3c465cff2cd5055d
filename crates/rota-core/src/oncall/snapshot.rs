use std::collections::HashSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::error::DomainError;
use crate::ids::{ScheduleId, UserId};
use crate::schedule::{OverrideKind, ScheduleData, ScheduleRule, UserOverride};

/// Immutable bundle of everything one evaluation of a schedule needs.
///
/// Built fresh for each job run and never shared across evaluations;
/// everything derived from it (`resolve_on_call`, `plan`, `next_wake`) is
/// pure.
#[derive(Debug, Clone)]
pub struct ScheduleSnapshot {
    pub schedule_id: ScheduleId,
    pub time_zone: Tz,
    /// The stored configuration document as-is, kept for merge-on-write.
    pub raw_data: Option<Value>,
    pub data: Option<ScheduleData>,
    /// Users currently recorded as on call.
    pub current_on_call: HashSet<UserId>,
    pub rules: Vec<ScheduleRule>,
    /// Overrides in stable input order; application order matters when
    /// two overrides interact.
    pub overrides: Vec<UserOverride>,
}

impl ScheduleSnapshot {
    pub fn new(
        schedule_id: ScheduleId,
        time_zone: Tz,
        raw_data: Option<&str>,
        rules: Vec<ScheduleRule>,
        overrides: Vec<UserOverride>,
        current_on_call: Vec<UserId>,
    ) -> Result<Self, DomainError> {
        let raw = raw_data
            .map(|s| {
                serde_json::from_str::<Value>(s)
                    .map_err(|e| DomainError::InvalidScheduleData(e.to_string()))
            })
            .transpose()?;
        let data = raw_data.map(ScheduleData::parse).transpose()?;

        Ok(Self {
            schedule_id,
            time_zone,
            raw_data: raw,
            data,
            current_on_call: current_on_call.into_iter().collect(),
            rules,
            overrides,
        })
    }

    /// The set of users on call at `now`.
    ///
    /// An active temporary schedule takes absolute precedence; otherwise
    /// rules resolve in the schedule's zone, then overrides apply on top
    /// in input order. A schedule with no rules and no overrides resolves
    /// to the empty set.
    pub fn resolve_on_call(&self, now: DateTime<Utc>) -> HashSet<UserId> {
        if let Some(data) = &self.data {
            if let Some(users) = data.temp_on_call(now) {
                return users;
            }
        }

        let local = now.with_timezone(&self.time_zone);
        let mut on_call = HashSet::new();
        for rule in &self.rules {
            if rule.is_active(&local) {
                on_call.insert(rule.user_id.clone());
            }
        }

        for o in &self.overrides {
            if !o.is_active_at(now) {
                continue;
            }
            match o.kind() {
                Some(OverrideKind::Add(user)) => {
                    on_call.insert(user.clone());
                }
                Some(OverrideKind::Remove(user)) => {
                    on_call.remove(user);
                }
                Some(OverrideKind::Replace { remove, add }) => {
                    // replace, not unconditional add: only swaps a user
                    // who is actually on call
                    if on_call.remove(remove) {
                        on_call.insert(add.clone());
                    }
                }
                None => {}
            }
        }

        on_call
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, WeekdayFilter};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn all_day_rule(schedule_id: &ScheduleId, user_id: &UserId) -> ScheduleRule {
        ScheduleRule::new(
            schedule_id.clone(),
            user_id.clone(),
            WeekdayFilter::every_day(),
            Clock::new(0, 0),
            Clock::new(0, 0),
        )
    }

    fn snapshot(
        rules: Vec<ScheduleRule>,
        overrides: Vec<UserOverride>,
        raw_data: Option<&str>,
    ) -> ScheduleSnapshot {
        ScheduleSnapshot::new(
            ScheduleId::new(),
            chrono_tz::UTC,
            raw_data,
            rules,
            overrides,
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn empty_schedule_resolves_to_empty_set() {
        let snap = snapshot(vec![], vec![], None);
        assert!(snap.resolve_on_call(ts("2023-10-01T12:00:00Z")).is_empty());
    }

    #[test]
    fn active_rule_puts_its_user_on_call() {
        let sched = ScheduleId::new();
        let user = UserId::new();
        let snap = snapshot(vec![all_day_rule(&sched, &user)], vec![], None);

        assert_eq!(
            snap.resolve_on_call(ts("2023-10-01T12:00:00Z")),
            HashSet::from([user])
        );
    }

    #[test]
    fn replace_override_swaps_an_on_call_user() {
        let sched = ScheduleId::new();
        let a = UserId::new();
        let b = UserId::new();
        let ovr = UserOverride::replace(
            sched.clone(),
            a.clone(),
            b.clone(),
            ts("2023-10-01T00:00:00Z"),
            ts("2023-10-02T00:00:00Z"),
        );
        let snap = snapshot(vec![all_day_rule(&sched, &a)], vec![ovr], None);

        assert_eq!(
            snap.resolve_on_call(ts("2023-10-01T12:00:00Z")),
            HashSet::from([b])
        );
    }

    #[test]
    fn replace_override_missing_target_is_a_noop() {
        let sched = ScheduleId::new();
        let a = UserId::new();
        let c = UserId::new();
        let b = UserId::new();
        let ovr = UserOverride::replace(
            sched.clone(),
            c,
            b,
            ts("2023-10-01T00:00:00Z"),
            ts("2023-10-02T00:00:00Z"),
        );
        let snap = snapshot(vec![all_day_rule(&sched, &a)], vec![ovr], None);

        assert_eq!(
            snap.resolve_on_call(ts("2023-10-01T12:00:00Z")),
            HashSet::from([a])
        );
    }

    #[test]
    fn add_and_remove_overrides_adjust_the_set() {
        let sched = ScheduleId::new();
        let a = UserId::new();
        let b = UserId::new();
        let start = ts("2023-10-01T00:00:00Z");
        let end = ts("2023-10-02T00:00:00Z");
        let snap = snapshot(
            vec![all_day_rule(&sched, &a)],
            vec![
                UserOverride::add(sched.clone(), b.clone(), start, end),
                UserOverride::remove(sched.clone(), a.clone(), start, end),
            ],
            None,
        );

        assert_eq!(
            snap.resolve_on_call(ts("2023-10-01T12:00:00Z")),
            HashSet::from([b])
        );
    }

    #[test]
    fn expired_overrides_are_ignored() {
        let sched = ScheduleId::new();
        let a = UserId::new();
        let b = UserId::new();
        let ovr = UserOverride::add(
            sched.clone(),
            b,
            ts("2023-09-01T00:00:00Z"),
            ts("2023-09-02T00:00:00Z"),
        );
        let snap = snapshot(vec![all_day_rule(&sched, &a)], vec![ovr], None);

        assert_eq!(
            snap.resolve_on_call(ts("2023-10-01T12:00:00Z")),
            HashSet::from([a])
        );
    }

    #[test]
    fn interacting_overrides_apply_in_input_order() {
        let sched = ScheduleId::new();
        let a = UserId::new();
        let b = UserId::new();
        let start = ts("2023-10-01T00:00:00Z");
        let end = ts("2023-10-02T00:00:00Z");

        // add B, then remove B: remove wins because it runs second
        let snap = snapshot(
            vec![all_day_rule(&sched, &a)],
            vec![
                UserOverride::add(sched.clone(), b.clone(), start, end),
                UserOverride::remove(sched.clone(), b.clone(), start, end),
            ],
            None,
        );
        assert_eq!(
            snap.resolve_on_call(ts("2023-10-01T12:00:00Z")),
            HashSet::from([a.clone()])
        );

        // reversed order: the add lands last and B stays
        let snap = snapshot(
            vec![all_day_rule(&sched, &a)],
            vec![
                UserOverride::remove(sched.clone(), b.clone(), start, end),
                UserOverride::add(sched.clone(), b.clone(), start, end),
            ],
            None,
        );
        assert_eq!(
            snap.resolve_on_call(ts("2023-10-01T12:00:00Z")),
            HashSet::from([a, b])
        );
    }

    #[test]
    fn temporary_schedule_takes_absolute_precedence() {
        let sched = ScheduleId::new();
        let rule_user = UserId::new();
        let temp_user = UserId::new();
        let raw = format!(
            r#"{{"v1":{{"temporarySchedules":[{{"start":"2023-10-01T00:00:00Z","end":"2023-10-02T00:00:00Z","shifts":[{{"start":"2023-10-01T00:00:00Z","end":"2023-10-02T00:00:00Z","userId":"{temp_user}"}}]}}]}}}}"#
        );
        // an override that would otherwise add another user
        let ovr = UserOverride::add(
            sched.clone(),
            UserId::new(),
            ts("2023-10-01T00:00:00Z"),
            ts("2023-10-02T00:00:00Z"),
        );
        let snap = snapshot(
            vec![all_day_rule(&sched, &rule_user)],
            vec![ovr],
            Some(&raw),
        );

        assert_eq!(
            snap.resolve_on_call(ts("2023-10-01T12:00:00Z")),
            HashSet::from([temp_user])
        );
        // outside the temporary window, normal resolution resumes
        let after = snap.resolve_on_call(ts("2023-10-03T12:00:00Z"));
        assert!(after.contains(&rule_user));
    }

    #[test]
    fn malformed_raw_data_fails_snapshot_construction() {
        let result = ScheduleSnapshot::new(
            ScheduleId::new(),
            chrono_tz::UTC,
            Some("{not json"),
            vec![],
            vec![],
            vec![],
        );
        assert!(matches!(result, Err(DomainError::InvalidScheduleData(_))));
    }
}
