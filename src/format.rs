//! Text line format for logged events.
//!
//! Every event becomes one line: a `DD/MM/YYYY HH:MM:SS.mmm` timestamp, a
//! space, and the payload values joined by `", "`. The bracketed style wraps
//! the timestamp in `[...]`. Lines can be parsed back with [`parse_line`].

use crate::event::{MeasurementEvent, Payload};
use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use std::fmt::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// `strftime` pattern for line timestamps.
pub const TIMESTAMP_PATTERN: &str = "%d/%m/%Y %H:%M:%S%.3f";

/// Rendered length of [`TIMESTAMP_PATTERN`].
const TIMESTAMP_LEN: usize = 23;

/// Separator between payload values.
pub const FIELD_SEPARATOR: &str = ", ";

/// How the timestamp prefix is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampStyle {
    /// `01/02/2024 10:00:00.000 1.0, 2.0, 3.0`
    #[default]
    Plain,
    /// `[01/02/2024 10:00:00.000] 1.0, 2.0, 3.0`
    Bracketed,
}

/// Time zone used to render timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeBasis {
    /// The host's local time zone
    #[default]
    Local,
    Utc,
    /// A fixed offset from UTC
    Fixed(FixedOffset),
}

impl TimeBasis {
    /// Render `timestamp` with [`TIMESTAMP_PATTERN`].
    ///
    /// Fails for instants chrono cannot represent.
    pub fn format(&self, timestamp: SystemTime) -> Result<String, FormatError> {
        let utc = to_utc(timestamp).ok_or(FormatError::TimestampOutOfRange(timestamp))?;
        Ok(match self {
            TimeBasis::Local => utc
                .with_timezone(&Local)
                .format(TIMESTAMP_PATTERN)
                .to_string(),
            TimeBasis::Utc => utc.format(TIMESTAMP_PATTERN).to_string(),
            TimeBasis::Fixed(offset) => utc
                .with_timezone(offset)
                .format(TIMESTAMP_PATTERN)
                .to_string(),
        })
    }

    /// Inverse of [`TimeBasis::format`]. Ambiguous local times resolve to the
    /// earlier instant.
    pub fn parse(&self, text: &str) -> Result<SystemTime, ParseLineError> {
        let naive = NaiveDateTime::parse_from_str(text, TIMESTAMP_PATTERN)
            .map_err(|_| ParseLineError::Timestamp(text.to_string()))?;
        let resolved = match self {
            TimeBasis::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(SystemTime::from),
            TimeBasis::Utc => Some(SystemTime::from(Utc.from_utc_datetime(&naive))),
            TimeBasis::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(SystemTime::from),
        };
        resolved.ok_or_else(|| ParseLineError::Timestamp(text.to_string()))
    }
}

/// Convert without chrono's panicking `From<SystemTime>`. Only four-digit
/// years are accepted so every timestamp keeps [`TIMESTAMP_LEN`].
fn to_utc(timestamp: SystemTime) -> Option<DateTime<Utc>> {
    let (secs, nanos) = match timestamp.duration_since(UNIX_EPOCH) {
        Ok(after) => (i64::try_from(after.as_secs()).ok()?, after.subsec_nanos()),
        Err(before) => {
            let before = before.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => (-secs, 0),
                n => (-secs - 1, 1_000_000_000 - n),
            }
        }
    };
    DateTime::from_timestamp(secs, nanos).filter(|utc| (0..=9999).contains(&utc.year()))
}

/// Errors produced while turning an event into a line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("timestamp {0:?} is outside the representable date range")]
    TimestampOutOfRange(SystemTime),
}

/// Formats events into complete output lines.
pub trait LineFormatter: Send + Sync {
    /// Format an event as one line, including the trailing newline.
    fn format(&self, event: &MeasurementEvent) -> Result<String, FormatError>;
}

/// Write a float in its shortest round-trip form, always with a fractional
/// part (`1.0` rather than `1`).
fn write_decimal<T: fmt::Display>(out: &mut String, value: T) -> fmt::Result {
    let start = out.len();
    write!(out, "{value}")?;
    let written = &out[start..];
    if written.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        out.push_str(".0");
    }
    Ok(())
}

fn write_fields(out: &mut String, payload: &Payload) -> fmt::Result {
    match payload {
        Payload::Motion(values) => {
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(FIELD_SEPARATOR);
                }
                write_decimal(out, value)?;
            }
        }
        Payload::Location {
            latitude,
            longitude,
        } => {
            write_decimal(out, latitude)?;
            out.push_str(FIELD_SEPARATOR);
            write_decimal(out, longitude)?;
        }
    }
    Ok(())
}

/// The line formatter used by the logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLineFormatter {
    style: TimestampStyle,
    basis: TimeBasis,
}

impl TextLineFormatter {
    pub fn new(style: TimestampStyle, basis: TimeBasis) -> Self {
        Self { style, basis }
    }

    pub fn style(&self) -> TimestampStyle {
        self.style
    }

    pub fn basis(&self) -> TimeBasis {
        self.basis
    }
}

impl LineFormatter for TextLineFormatter {
    fn format(&self, event: &MeasurementEvent) -> Result<String, FormatError> {
        let stamp = self.basis.format(event.timestamp())?;
        let mut line = String::with_capacity(64);
        match self.style {
            TimestampStyle::Plain => line.push_str(&stamp),
            TimestampStyle::Bracketed => {
                line.push('[');
                line.push_str(&stamp);
                line.push(']');
            }
        }
        line.push(' ');
        // Writing into a String cannot fail.
        let _ = write_fields(&mut line, event.payload());
        line.push('\n');
        Ok(line)
    }
}

/// Errors produced while reading a line back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseLineError {
    #[error("line is missing its timestamp prefix")]
    MissingTimestamp,
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
    #[error("line has no payload")]
    MissingPayload,
    #[error("invalid field value: {0}")]
    Field(String),
}

/// A line read back from an output file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub timestamp: SystemTime,
    pub fields: Vec<f64>,
}

/// Parse one line (with or without its trailing newline).
pub fn parse_line(
    line: &str,
    style: TimestampStyle,
    basis: TimeBasis,
) -> Result<ParsedLine, ParseLineError> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    let (stamp, rest) = match style {
        TimestampStyle::Plain => {
            let stamp = line
                .get(..TIMESTAMP_LEN)
                .ok_or(ParseLineError::MissingTimestamp)?;
            (stamp, &line[TIMESTAMP_LEN..])
        }
        TimestampStyle::Bracketed => line
            .strip_prefix('[')
            .and_then(|l| l.split_once(']'))
            .ok_or(ParseLineError::MissingTimestamp)?,
    };

    let timestamp = basis.parse(stamp)?;
    let payload = rest.strip_prefix(' ').ok_or(ParseLineError::MissingPayload)?;
    if payload.is_empty() {
        return Err(ParseLineError::MissingPayload);
    }

    let fields = payload
        .split(FIELD_SEPARATOR)
        .map(|f| {
            f.parse::<f64>()
                .map_err(|_| ParseLineError::Field(f.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedLine { timestamp, fields })
}
