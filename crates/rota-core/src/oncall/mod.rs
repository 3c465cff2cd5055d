pub mod plan;
pub mod snapshot;
pub mod wake;

pub use plan::UpdatePlan;
pub use snapshot::ScheduleSnapshot;
