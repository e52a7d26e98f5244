use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WeekError {
    #[error("minimal days in first week must be between 1 and 7, got {0}")]
    InvalidMinimalDays(u8),

    #[error("UTC offset out of range: {0} minutes")]
    InvalidUtcOffset(i32),

    #[error("invalid week id {0:?}, expected YYYY-Www")]
    InvalidWeekId(String),
}
