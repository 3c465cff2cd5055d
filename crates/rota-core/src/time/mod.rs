pub mod clock;
pub mod weekday_filter;

pub use clock::{dst_change, Clock, DstChange};
pub use weekday_filter::WeekdayFilter;
