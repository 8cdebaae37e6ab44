//! Measurement events delivered by the platform's sensor and location services.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use thiserror::Error;

/// Identifies which measurement source an event came from.
///
/// Each tag owns exactly one output stream in the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum ProducerTag {
    /// Three-axis accelerometer (m/s²)
    #[value(alias = "accel")]
    Accelerometer,
    /// Three-axis gyroscope (rad/s)
    #[value(alias = "gyro")]
    Gyroscope,
    /// Network or GPS location fix
    #[value(alias = "gps")]
    Location,
}

impl ProducerTag {
    /// Every tag, in stream order.
    pub const ALL: [ProducerTag; 3] = [
        ProducerTag::Accelerometer,
        ProducerTag::Gyroscope,
        ProducerTag::Location,
    ];

    /// Position of this tag in [`ProducerTag::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            ProducerTag::Accelerometer => 0,
            ProducerTag::Gyroscope => 1,
            ProducerTag::Location => 2,
        }
    }

    /// Lower-case name used in file names, CLI arguments and log output.
    pub fn as_str(self) -> &'static str {
        match self {
            ProducerTag::Accelerometer => "accelerometer",
            ProducerTag::Gyroscope => "gyroscope",
            ProducerTag::Location => "location",
        }
    }

    /// Whether `payload` has the shape this producer emits.
    pub fn accepts(self, payload: &Payload) -> bool {
        matches!(
            (self, payload),
            (ProducerTag::Accelerometer | ProducerTag::Gyroscope, Payload::Motion(_))
                | (ProducerTag::Location, Payload::Location { .. })
        )
    }
}

impl fmt::Display for ProducerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a producer tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown producer '{0}' (expected accelerometer, gyroscope or location)")]
pub struct ParseTagError(pub String);

impl FromStr for ProducerTag {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accelerometer" | "accel" => Ok(ProducerTag::Accelerometer),
            "gyroscope" | "gyro" => Ok(ProducerTag::Gyroscope),
            "location" | "gps" => Ok(ProducerTag::Location),
            _ => Err(ParseTagError(s.to_string())),
        }
    }
}

/// Reading carried by an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    /// Raw x, y, z values as reported by a motion sensor
    Motion([f32; 3]),
    /// Coordinates in decimal degrees
    Location { latitude: f64, longitude: f64 },
}

impl Payload {
    /// Values in the order they are written to a line.
    pub fn fields(&self) -> Vec<f64> {
        match *self {
            Payload::Motion(values) => values.iter().map(|v| f64::from(*v)).collect(),
            Payload::Location {
                latitude,
                longitude,
            } => vec![latitude, longitude],
        }
    }

    /// Short name of the payload shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Motion(_) => "motion",
            Payload::Location { .. } => "location",
        }
    }
}

/// A single time-stamped reading from one producer.
///
/// Events are immutable once built; the logger only reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementEvent {
    tag: ProducerTag,
    timestamp: SystemTime,
    payload: Payload,
}

impl MeasurementEvent {
    /// Build an event captured at `timestamp`.
    pub fn new(tag: ProducerTag, timestamp: SystemTime, payload: Payload) -> Self {
        Self {
            tag,
            timestamp,
            payload,
        }
    }

    /// Accelerometer reading captured now.
    pub fn accelerometer(x: f32, y: f32, z: f32) -> Self {
        Self::new(
            ProducerTag::Accelerometer,
            SystemTime::now(),
            Payload::Motion([x, y, z]),
        )
    }

    /// Gyroscope reading captured now.
    pub fn gyroscope(x: f32, y: f32, z: f32) -> Self {
        Self::new(
            ProducerTag::Gyroscope,
            SystemTime::now(),
            Payload::Motion([x, y, z]),
        )
    }

    /// Location fix captured now.
    pub fn location(latitude: f64, longitude: f64) -> Self {
        Self::new(
            ProducerTag::Location,
            SystemTime::now(),
            Payload::Location {
                latitude,
                longitude,
            },
        )
    }

    /// Same event with a different capture time.
    pub fn with_timestamp(self, timestamp: SystemTime) -> Self {
        Self { timestamp, ..self }
    }

    pub fn tag(&self) -> ProducerTag {
        self.tag
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}
