pub mod data;
pub mod notification;
pub mod rule;
pub mod temporary;
pub mod user_override;

pub use data::{DataV1, ScheduleData};
pub use notification::OnCallNotificationRule;
pub use rule::ScheduleRule;
pub use temporary::{FixedShift, TemporarySchedule};
pub use user_override::{OverrideKind, UserOverride};
