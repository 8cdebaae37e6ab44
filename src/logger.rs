//! Concurrent per-stream event logger.
//!
//! [`EventLogger`] owns one [`OutputStream`] per [`ProducerTag`]. Producers on
//! arbitrary threads call [`EventLogger::record`]; each call formats one line
//! and appends it to that tag's file. Writers to the same stream take turns
//! through a writer slot (a mutex plus condition variable), so lines never
//! interleave, while different streams never wait on each other.
//!
//! The file handle is checked out of the slot for the duration of the write,
//! which keeps the slot mutex out of the I/O path and lets waiters give up
//! after a bounded time when a lock timeout is configured.

use crate::event::{MeasurementEvent, ProducerTag};
use crate::format::{FormatError, LineFormatter, TextLineFormatter, TimeBasis, TimestampStyle};
use crate::layout::StreamLayout;
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by the logger.
#[derive(Error, Debug)]
pub enum LogError {
    /// Appending to (or opening, syncing) a stream's file failed.
    #[error("I/O failure on {tag} stream ({}): {source}", path.display())]
    IoFailure {
        tag: ProducerTag,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The output directory could not be created.
    #[error("cannot create output directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The stream was shut down; it is never reopened.
    #[error("{0} stream is closed")]
    StreamClosed(ProducerTag),
    /// Another writer held the stream for longer than the lock timeout.
    #[error("timed out after {waited:?} waiting for the {tag} stream")]
    Timeout { tag: ProducerTag, waited: Duration },
    /// The event could not be turned into a line; nothing was written.
    #[error("cannot format {tag} event: {source}")]
    Format {
        tag: ProducerTag,
        #[source]
        source: FormatError,
    },
    /// The event's payload does not match its producer.
    #[error("{tag} events cannot carry a {payload} payload")]
    PayloadMismatch {
        tag: ProducerTag,
        payload: &'static str,
    },
}

/// When stream files are opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenPolicy {
    /// Open every stream while constructing the logger.
    #[default]
    Eager,
    /// Open each stream on its first `record`.
    Lazy,
}

/// Lifecycle of one output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unopened,
    Open,
    Closed,
}

/// Counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub lines_written: u64,
    pub bytes_written: u64,
    pub failures: u64,
}

/// Logger construction settings.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Directory the stream files live in; created if missing
    pub directory: PathBuf,
    pub layout: StreamLayout,
    pub style: TimestampStyle,
    pub basis: TimeBasis,
    pub open_policy: OpenPolicy,
    /// Upper bound on waiting for another writer; `None` waits indefinitely
    pub lock_timeout: Option<Duration>,
}

impl LoggerConfig {
    /// Default settings writing into `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            layout: StreamLayout::default(),
            style: TimestampStyle::default(),
            basis: TimeBasis::default(),
            open_policy: OpenPolicy::default(),
            lock_timeout: None,
        }
    }

    pub fn with_layout(mut self, layout: StreamLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_style(mut self, style: TimestampStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_basis(mut self, basis: TimeBasis) -> Self {
        self.basis = basis;
        self
    }

    pub fn with_open_policy(mut self, open_policy: OpenPolicy) -> Self {
        self.open_policy = open_policy;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

/// A sink that can be cut back to an earlier length.
trait Truncate: Write {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// An append-mode file plus the length it had after our last complete line.
#[derive(Debug)]
struct OpenFile<F = File> {
    file: F,
    len: u64,
}

impl OpenFile {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl<F: Truncate> OpenFile<F> {
    /// Append `line` with a single write. On failure the file is cut back to
    /// its previous length so no partial line is left behind.
    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        match self.file.write_all(line) {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.file.truncate(self.len) {
                    warn!("could not roll back partial line: {rollback}");
                }
                Err(e)
            }
        }
    }
}

#[derive(Debug)]
struct Slot {
    state: StreamState,
    /// `None` while unopened, closed, or checked out by a writer
    file: Option<OpenFile>,
    writing: bool,
    stats: StreamStats,
}

/// One tag's file and its serialization lock.
#[derive(Debug)]
pub struct OutputStream {
    tag: ProducerTag,
    path: PathBuf,
    slot: Mutex<Slot>,
    released: Condvar,
}

impl OutputStream {
    fn new(tag: ProducerTag, path: PathBuf) -> Self {
        Self {
            tag,
            path,
            slot: Mutex::new(Slot {
                state: StreamState::Unopened,
                file: None,
                writing: false,
                stats: StreamStats::default(),
            }),
            released: Condvar::new(),
        }
    }

    pub fn tag(&self) -> ProducerTag {
        self.tag
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> StreamState {
        self.lock_slot().state
    }

    pub fn stats(&self) -> StreamStats {
        self.lock_slot().stats
    }

    fn io_failure(&self, source: io::Error) -> LogError {
        LogError::IoFailure {
            tag: self.tag,
            path: self.path.clone(),
            source,
        }
    }

    // No code panics while holding the slot, so a poisoned mutex still
    // guards consistent state.
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no writer holds the stream.
    fn acquire(&self, timeout: Option<Duration>) -> Result<MutexGuard<'_, Slot>, LogError> {
        let slot = self.lock_slot();
        match timeout {
            None => Ok(self
                .released
                .wait_while(slot, |s| s.writing)
                .unwrap_or_else(PoisonError::into_inner)),
            Some(limit) => {
                let (slot, result) = self
                    .released
                    .wait_timeout_while(slot, limit, |s| s.writing)
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() && slot.writing {
                    Err(LogError::Timeout {
                        tag: self.tag,
                        waited: limit,
                    })
                } else {
                    Ok(slot)
                }
            }
        }
    }

    /// Move an unopened stream to `Open`. No-op if already open or closed.
    fn open(&self) -> Result<(), LogError> {
        let mut slot = self.acquire(None)?;
        if slot.state != StreamState::Unopened {
            return Ok(());
        }
        let file = OpenFile::open(&self.path).map_err(|e| self.io_failure(e))?;
        debug!(
            "opened {} stream at {} ({} bytes)",
            self.tag,
            self.path.display(),
            file.len
        );
        slot.file = Some(file);
        slot.state = StreamState::Open;
        Ok(())
    }

    fn append(&self, line: &[u8], timeout: Option<Duration>) -> Result<(), LogError> {
        let mut slot = self.acquire(timeout)?;
        if slot.state == StreamState::Closed {
            return Err(LogError::StreamClosed(self.tag));
        }
        let checked_out = slot.file.take();
        slot.writing = true;
        drop(slot);

        let (file, result) = match checked_out.map_or_else(|| OpenFile::open(&self.path), Ok) {
            Ok(mut file) => {
                let result = file.append(line);
                (Some(file), result)
            }
            Err(e) => (None, Err(e)),
        };

        let mut slot = self.lock_slot();
        slot.writing = false;
        if let Some(file) = file {
            if slot.state == StreamState::Unopened {
                debug!("opened {} stream at {}", self.tag, self.path.display());
                slot.state = StreamState::Open;
            }
            slot.file = Some(file);
        }
        if result.is_ok() {
            slot.stats.lines_written += 1;
            slot.stats.bytes_written += line.len() as u64;
        } else {
            slot.stats.failures += 1;
        }
        drop(slot);
        self.released.notify_all();

        result.map_err(|e| {
            warn!("{} stream write failed: {e}", self.tag);
            self.io_failure(e)
        })
    }

    /// Wait for any in-flight write, then sync and close the file.
    /// Closing twice is a no-op.
    fn close(&self) -> Result<(), LogError> {
        let mut slot = self.acquire(None)?;
        if slot.state == StreamState::Closed {
            return Ok(());
        }
        slot.state = StreamState::Closed;
        let file = slot.file.take();
        let stats = slot.stats;
        drop(slot);
        self.released.notify_all();

        info!(
            "closed {} stream: {} lines, {} bytes, {} failures",
            self.tag, stats.lines_written, stats.bytes_written, stats.failures
        );
        match file {
            Some(open) => open.file.sync_all().map_err(|e| self.io_failure(e)),
            None => Ok(()),
        }
    }
}

/// Appends measurement events to one file per producer.
///
/// `record` may be called from any number of threads; share the logger with
/// an `Arc`.
pub struct EventLogger {
    directory: PathBuf,
    streams: [OutputStream; 3],
    formatter: Box<dyn LineFormatter>,
    lock_timeout: Option<Duration>,
}

impl EventLogger {
    /// Create the output directory and build every stream, opening them
    /// immediately under [`OpenPolicy::Eager`].
    pub fn open(config: LoggerConfig) -> Result<Self, LogError> {
        let formatter = TextLineFormatter::new(config.style, config.basis);
        Self::open_with_formatter(config, Box::new(formatter))
    }

    /// Like [`EventLogger::open`] but with a custom line formatter.
    pub fn open_with_formatter(
        config: LoggerConfig,
        formatter: Box<dyn LineFormatter>,
    ) -> Result<Self, LogError> {
        fs::create_dir_all(&config.directory).map_err(|source| LogError::Directory {
            path: config.directory.clone(),
            source,
        })?;

        let streams = ProducerTag::ALL
            .map(|tag| OutputStream::new(tag, config.layout.path_in(&config.directory, tag)));

        let logger = Self {
            directory: config.directory,
            streams,
            formatter,
            lock_timeout: config.lock_timeout,
        };

        if config.open_policy == OpenPolicy::Eager {
            for stream in &logger.streams {
                stream.open()?;
            }
        }

        Ok(logger)
    }

    /// Append `event` to its producer's file as one line.
    ///
    /// The line is fully written before this returns. On error nothing is
    /// left in the file and the caller decides whether to drop or retry.
    pub fn record(&self, event: &MeasurementEvent) -> Result<(), LogError> {
        let tag = event.tag();
        if !tag.accepts(event.payload()) {
            return Err(LogError::PayloadMismatch {
                tag,
                payload: event.payload().kind(),
            });
        }
        let line = self
            .formatter
            .format(event)
            .map_err(|source| LogError::Format { tag, source })?;
        self.stream(tag).append(line.as_bytes(), self.lock_timeout)
    }

    /// Close one stream. Later `record` calls for `tag` fail with
    /// [`LogError::StreamClosed`].
    pub fn close(&self, tag: ProducerTag) -> Result<(), LogError> {
        self.stream(tag).close()
    }

    /// Flush and close every stream. Every stream is closed even if an
    /// earlier one fails; the first error is returned.
    pub fn shutdown(&self) -> Result<(), LogError> {
        let mut first_error = None;
        for stream in &self.streams {
            if let Err(e) = stream.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn stream(&self, tag: ProducerTag) -> &OutputStream {
        &self.streams[tag.index()]
    }

    pub fn state(&self, tag: ProducerTag) -> StreamState {
        self.stream(tag).state()
    }

    pub fn path(&self, tag: ProducerTag) -> &Path {
        self.stream(tag).path()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Per-tag counters, in [`ProducerTag::ALL`] order.
    pub fn stats(&self) -> [(ProducerTag, StreamStats); 3] {
        ProducerTag::ALL.map(|tag| (tag, self.stream(tag).stats()))
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("error closing streams on drop: {e}");
        }
    }
}
