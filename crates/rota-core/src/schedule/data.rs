use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::ids::UserId;
use crate::schedule::notification::OnCallNotificationRule;
use crate::schedule::temporary::TemporarySchedule;

/// The schedule's JSON configuration blob.
///
/// The stored document may carry fields owned by other writers; this type
/// models only the portion this engine reads and rewrites. Writes go
/// through [`ScheduleData::apply_to_raw`] so unrelated fields survive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleData {
    #[serde(default)]
    pub v1: DataV1,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataV1 {
    #[serde(default)]
    pub temporary_schedules: Vec<TemporarySchedule>,
    #[serde(default)]
    pub on_call_notification_rules: Vec<OnCallNotificationRule>,
}

impl ScheduleData {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        serde_json::from_str(raw).map_err(|e| DomainError::InvalidScheduleData(e.to_string()))
    }

    /// The active temporary schedule's user set, or `None` when no
    /// temporary schedule covers `at` (normal resolution applies).
    pub fn temp_on_call(&self, at: DateTime<Utc>) -> Option<HashSet<UserId>> {
        self.v1
            .temporary_schedules
            .iter()
            .find(|t| t.is_active_at(at))
            .map(|t| t.on_call_at(at))
    }

    /// Serializes this data merged over the raw stored document, replacing
    /// only the fields this type owns. Arrays are replaced wholesale.
    pub fn apply_to_raw(&self, raw: Option<&Value>) -> Result<String, DomainError> {
        let patch = serde_json::to_value(self)
            .map_err(|e| DomainError::SerializeScheduleData(e.to_string()))?;
        let mut doc = raw.cloned().unwrap_or_else(|| Value::Object(Default::default()));
        merge(&mut doc, patch);
        serde_json::to_string(&doc).map_err(|e| DomainError::SerializeScheduleData(e.to_string()))
    }
}

fn merge(doc: &mut Value, patch: Value) {
    match (doc, patch) {
        (Value::Object(doc), Value::Object(patch)) => {
            for (key, value) in patch {
                match doc.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        doc.insert(key, value);
                    }
                }
            }
        }
        (doc, patch) => *doc = patch,
    }
}
