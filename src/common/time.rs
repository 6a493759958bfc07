//! Wall-clock access, isolated behind a function so call sites don't depend
//! directly on `std::time::SystemTime`.

use crate::model::Timestamp;

/// Returns the time since `UNIX_EPOCH` in milliseconds.
pub fn current_time_millis() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Timestamp
}
