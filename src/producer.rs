//! Measurement producers.
//!
//! On a device the platform's sensor and location services call back into the
//! logger from their own threads. [`Producer`] models one such source; the app
//! drives each producer on its own blocking thread. [`SyntheticProducer`]
//! generates plausible readings at a fixed sampling interval for hosts without
//! real sensors.

use crate::event::{MeasurementEvent, Payload, ProducerTag};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Standard gravity in m/s².
const GRAVITY: f64 = 9.80665;

/// Starting point of the synthetic location track (Helsinki).
const ORIGIN: (f64, f64) = (60.1699, 24.9384);

/// Radius of the synthetic location track in degrees.
const TRACK_RADIUS_DEG: f64 = 0.001;

/// Longest sleep between checks of the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// A source of measurement events for one tag.
pub trait Producer: Send {
    fn tag(&self) -> ProducerTag;

    /// Block until the next reading is available.
    ///
    /// Returns `None` once the producer has nothing more to deliver, or when
    /// `stop` is set while waiting.
    fn next_event(&mut self, stop: &AtomicBool) -> Option<MeasurementEvent>;
}

/// Generates smooth waveforms for motion sensors and a slow circular track
/// for location, paced at `interval`.
#[derive(Debug, Clone)]
pub struct SyntheticProducer {
    tag: ProducerTag,
    interval: Duration,
    limit: Option<u64>,
    emitted: u64,
}

impl SyntheticProducer {
    /// # Arguments
    /// * `tag` - Which sensor to imitate
    /// * `interval` - Sampling interval; the first event is delivered immediately
    /// * `limit` - Stop after this many events (`None` runs until stopped)
    pub fn new(tag: ProducerTag, interval: Duration, limit: Option<u64>) -> Self {
        Self {
            tag,
            interval,
            limit,
            emitted: 0,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Sleep one interval in short slices. Returns `false` if `stop` was set.
    fn pace(&self, stop: &AtomicBool) -> bool {
        let start = Instant::now();
        loop {
            if stop.load(Ordering::Relaxed) {
                return false;
            }
            let elapsed = start.elapsed();
            if elapsed >= self.interval {
                return true;
            }
            thread::sleep((self.interval - elapsed).min(STOP_POLL));
        }
    }

    /// Reading at simulated time `t` seconds.
    fn payload_at(&self, t: f64) -> Payload {
        match self.tag {
            ProducerTag::Accelerometer => Payload::Motion([
                (0.3 * (TAU * 0.5 * t).sin()) as f32,
                (0.2 * (TAU * 0.5 * t).cos()) as f32,
                (GRAVITY + 0.05 * (TAU * t).sin()) as f32,
            ]),
            ProducerTag::Gyroscope => Payload::Motion([
                (0.1 * (TAU * 0.25 * t).sin()) as f32,
                (0.05 * (TAU * 0.25 * t).cos()) as f32,
                (0.02 * (TAU * 0.75 * t).sin()) as f32,
            ]),
            ProducerTag::Location => {
                // one lap every ten minutes
                let angle = TAU * t / 600.0;
                Payload::Location {
                    latitude: ORIGIN.0 + TRACK_RADIUS_DEG * angle.sin(),
                    longitude: ORIGIN.1 + TRACK_RADIUS_DEG * (1.0 - angle.cos()),
                }
            }
        }
    }
}

impl Producer for SyntheticProducer {
    fn tag(&self) -> ProducerTag {
        self.tag
    }

    fn next_event(&mut self, stop: &AtomicBool) -> Option<MeasurementEvent> {
        if self.limit.is_some_and(|limit| self.emitted >= limit) {
            return None;
        }
        if self.emitted > 0 && !self.pace(stop) {
            return None;
        }

        let t = self.interval.as_secs_f64() * self.emitted as f64;
        let event = MeasurementEvent::new(self.tag, SystemTime::now(), self.payload_at(t));
        self.emitted += 1;
        Some(event)
    }
}
