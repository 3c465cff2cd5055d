pub mod error;
pub mod ids;
pub mod oncall;
pub mod schedule;
pub mod time;
