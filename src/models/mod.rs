mod reading;
mod snapshot;

pub use reading::{Reading, UNAVAILABLE_PREFIX};
pub use snapshot::{CategoryReading, Snapshot, TimestampFormat};
