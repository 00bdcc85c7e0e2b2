//! Append-only record files on the SD card.

pub mod csv_log;
pub mod json_log;
pub mod rotating;

pub use csv_log::AttitudeCsv;
pub use json_log::JsonArrayLog;
pub use rotating::{open_with_fallback, timestamped_name, LogTarget, RecordFormat, RotatingLog};
