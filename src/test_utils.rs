use crate::event::{MeasurementEvent, Payload, ProducerTag};
use crate::format::{TimeBasis, TimestampStyle};
use crate::logger::{EventLogger, LoggerConfig};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// `test_instant()` rendered in UTC.
pub const TEST_INSTANT_UTC_TEXT: &str = "09/09/2001 01:46:40.123";

/// A stable capture time for unit tests.
pub fn test_instant() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(1_000_000_000_123)
}

/// Build a motion event for `tag` at [`test_instant`].
pub fn motion_event(tag: ProducerTag, values: [f32; 3]) -> MeasurementEvent {
    MeasurementEvent::new(tag, test_instant(), Payload::Motion(values))
}

/// Build a location event at [`test_instant`].
pub fn location_event(latitude: f64, longitude: f64) -> MeasurementEvent {
    MeasurementEvent::new(
        ProducerTag::Location,
        test_instant(),
        Payload::Location {
            latitude,
            longitude,
        },
    )
}

/// Logger config writing into `dir` with UTC timestamps, so expected lines
/// don't depend on the host time zone.
pub fn utc_config(dir: &Path) -> LoggerConfig {
    LoggerConfig::new(dir)
        .with_style(TimestampStyle::Plain)
        .with_basis(TimeBasis::Utc)
}

/// Open a UTC logger in `dir`.
pub fn utc_logger(dir: &Path) -> EventLogger {
    EventLogger::open(utc_config(dir)).unwrap()
}

/// Read every line of `path`, without trailing newlines.
pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
