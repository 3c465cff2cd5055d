use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid clock format: {0}")]
    InvalidClockFormat(String),
    #[error("clock value out of range: {0}")]
    ClockOutOfRange(String),
    #[error("invalid time zone: {0}")]
    InvalidTimeZone(String),
    #[error("invalid schedule data: {0}")]
    InvalidScheduleData(String),
    #[error("serialize schedule data: {0}")]
    SerializeScheduleData(String),
    #[error("invalid id: {0}")]
    InvalidId(String),
}
