//! Core application runner for `sensor-logger`.
//!
//! This module is decoupled from CLI parsing and process exit codes so it can
//! be tested with injected producers and an injected stop signal.

use crate::duration::parse_duration;
use crate::event::ProducerTag;
use crate::format::{TimeBasis, TimestampStyle};
use crate::layout::{FileOverride, LayoutError, StreamLayout, parse_file_override};
use crate::logger::{EventLogger, LogError, LoggerConfig, OpenPolicy};
use crate::producer::{Producer, SyntheticProducer};
use clap::Parser;
use log::{debug, info, warn};
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

/// Configuration for a logging run.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Directory the stream files are appended to (created if missing).
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Override a stream's file name.
    /// Format: --file gyroscope=gyro.txt
    #[arg(long = "file", value_parser = parse_file_override, value_name = "TAG=FILE")]
    pub files: Vec<FileOverride>,

    /// Producers to run. Defaults to all of them.
    #[arg(long = "sensor", value_enum, value_delimiter = ',')]
    pub sensors: Vec<ProducerTag>,

    /// Sampling interval per producer.
    /// Accepts duration with suffix: 200ms, 1s, 1m.
    #[arg(long, default_value = "200ms", value_parser = parse_duration)]
    pub interval: Duration,

    /// Stop after this long. Without it, runs until Ctrl-C.
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Stop each producer after this many events.
    #[arg(long)]
    pub limit: Option<u64>,

    /// Give up on an event if its stream stays busy for this long.
    #[arg(long, value_parser = parse_duration)]
    pub lock_timeout: Option<Duration>,

    /// Write timestamps as `[DD/MM/YYYY HH:MM:SS.mmm]`.
    #[arg(long)]
    pub bracketed: bool,

    /// Format timestamps in UTC instead of local time.
    #[arg(long)]
    pub utc: bool,

    /// Open each file on its first event instead of at start-up.
    #[arg(long)]
    pub lazy_open: bool,

    /// Verbose output, log every opened stream and dropped event
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    /// Selected producers in stream order, without duplicates.
    pub fn selected_sensors(&self) -> Vec<ProducerTag> {
        if self.sensors.is_empty() {
            return ProducerTag::ALL.to_vec();
        }
        ProducerTag::ALL
            .into_iter()
            .filter(|tag| self.sensors.contains(tag))
            .collect()
    }

    pub fn logger_config(&self) -> Result<LoggerConfig, LayoutError> {
        let layout = StreamLayout::with_overrides(&self.files)?;
        let style = if self.bracketed {
            TimestampStyle::Bracketed
        } else {
            TimestampStyle::Plain
        };
        let basis = if self.utc {
            TimeBasis::Utc
        } else {
            TimeBasis::Local
        };
        let open_policy = if self.lazy_open {
            OpenPolicy::Lazy
        } else {
            OpenPolicy::Eager
        };

        Ok(LoggerConfig::new(self.output_dir.clone())
            .with_layout(layout)
            .with_style(style)
            .with_basis(basis)
            .with_open_policy(open_policy)
            .with_lock_timeout(self.lock_timeout))
    }
}

/// One synthetic producer per selected sensor.
pub fn synthetic_producers(options: &Options) -> Vec<Box<dyn Producer>> {
    options
        .selected_sensors()
        .into_iter()
        .map(|tag| {
            Box::new(SyntheticProducer::new(tag, options.interval, options.limit))
                as Box<dyn Producer>
        })
        .collect()
}

/// Errors returned by the run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("producer thread failed: {0}")]
    Producer(#[from] JoinError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What one producer delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    pub tag: ProducerTag,
    pub recorded: u64,
    pub dropped: u64,
}

/// Feed `producer` into the logger until it runs dry, `stop` is set, or its
/// stream is closed. Failed events are logged and dropped.
fn drive(
    mut producer: Box<dyn Producer>,
    logger: &EventLogger,
    stop: &AtomicBool,
) -> ProducerReport {
    let tag = producer.tag();
    let mut report = ProducerReport {
        tag,
        recorded: 0,
        dropped: 0,
    };

    while !stop.load(Ordering::Relaxed) {
        let Some(event) = producer.next_event(stop) else {
            debug!("{tag} producer finished");
            break;
        };
        match logger.record(&event) {
            Ok(()) => report.recorded += 1,
            Err(LogError::StreamClosed(_)) => {
                debug!("{tag} stream closed, stopping producer");
                break;
            }
            Err(e) => {
                warn!("dropping {tag} event: {e}");
                report.dropped += 1;
            }
        }
    }

    report
}

/// Run every producer on its own blocking thread, all recording into
/// `logger` concurrently, until they finish or `stop` resolves.
///
/// Reports are returned in stream order. If a producer thread fails, the
/// others are told to stop and joined before the first failure is returned.
pub async fn run_with_producers<F>(
    logger: Arc<EventLogger>,
    producers: Vec<Box<dyn Producer>>,
    stop: F,
) -> Result<Vec<ProducerReport>, RunError>
where
    F: Future<Output = ()>,
{
    let stop_flag = Arc::new(AtomicBool::new(false));
    let mut workers = JoinSet::new();
    for producer in producers {
        let logger = Arc::clone(&logger);
        let stop_flag = Arc::clone(&stop_flag);
        workers.spawn_blocking(move || drive(producer, &logger, &stop_flag));
    }

    tokio::pin!(stop);
    let mut stopping = false;
    let mut reports = Vec::new();
    let mut failure = None;
    loop {
        tokio::select! {
            () = &mut stop, if !stopping => {
                info!("stop requested, waiting for producers");
                stop_flag.store(true, Ordering::Relaxed);
                stopping = true;
            }
            joined = workers.join_next() => match joined {
                Some(Ok(report)) => reports.push(report),
                Some(Err(e)) => {
                    warn!("producer thread failed, stopping the rest: {e}");
                    stop_flag.store(true, Ordering::Relaxed);
                    stopping = true;
                    failure.get_or_insert(e);
                }
                None => break,
            }
        }
    }

    if let Some(e) = failure {
        return Err(e.into());
    }
    reports.sort_by_key(|r| r.tag);
    Ok(reports)
}

/// Open the logger described by `options`, run `producers` until `stop`,
/// shut the logger down and write a per-stream summary to `out`.
pub async fn run_with_io<F>(
    options: &Options,
    producers: Vec<Box<dyn Producer>>,
    stop: F,
    out: &mut dyn Write,
) -> Result<Vec<ProducerReport>, RunError>
where
    F: Future<Output = ()>,
{
    let logger = Arc::new(EventLogger::open(options.logger_config()?)?);
    info!("logging to {}", logger.directory().display());

    let reports = run_with_producers(Arc::clone(&logger), producers, stop).await?;
    logger.shutdown()?;

    for report in &reports {
        writeln!(
            out,
            "{}: {} recorded, {} dropped -> {}",
            report.tag,
            report.recorded,
            report.dropped,
            logger.path(report.tag).display()
        )?;
    }

    Ok(reports)
}
