use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("not found")]
    NotFound,
    /// The schedule row is gone; writes against it must become no-ops
    /// rather than failures.
    #[error("schedule deleted")]
    ScheduleDeleted,
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("connection error: {0}")]
    Connection(String),
}
