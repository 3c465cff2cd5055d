pub mod error;
pub mod manager;
pub mod tz_cache;
