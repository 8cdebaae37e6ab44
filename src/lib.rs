//! `sensor-logger` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The thread-safe [`EventLogger`] in [`crate::logger`] is the core: producers on
//! any number of threads call [`EventLogger::record`] and each event becomes one
//! line in its producer's file. [`crate::app`] drives producers against a logger
//! and can be tested deterministically with injected producers.

pub mod app;
pub mod duration;
pub mod event;
pub mod format;
pub mod layout;
pub mod logger;
pub mod producer;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use event::{MeasurementEvent, ParseTagError, Payload, ProducerTag};
pub use format::{
    FormatError, LineFormatter, ParseLineError, ParsedLine, TextLineFormatter, TimeBasis,
    TimestampStyle, parse_line,
};
pub use layout::{FileOverride, LayoutError, StreamLayout, parse_file_override};
pub use logger::{
    EventLogger, LogError, LoggerConfig, OpenPolicy, OutputStream, StreamState, StreamStats,
};
pub use producer::{Producer, SyntheticProducer};
