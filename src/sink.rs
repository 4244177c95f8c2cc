//! Output sinks and the async delivery adapter
//!
//! A [`Sink`] is a blocking destination for rendered lines. [`AsyncSink`]
//! wraps one sink with a bounded queue and a dedicated worker thread so
//! that producers never block on I/O: `emit` is a bounded enqueue attempt
//! that degrades to a synchronous write when the queue is saturated.
//! Shutdown drains the queue before joining the worker, so every
//! successfully enqueued line is written.

use crate::error::SinkError;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Default bound on the async delivery queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// A blocking destination for rendered log lines
pub trait Sink: Send {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Sink writing one line at a time to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Sink for ConsoleSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(line.as_bytes())?;
        handle.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Size-rotating file sink
///
/// Once the file reaches `max_size` bytes it is renamed into a bounded set
/// of numbered backups (`base.1` newest, `base.N` oldest, oldest beyond
/// `backup_count` deleted) and a fresh file is started. Only the owning
/// worker writes, so rotation needs no external locking.
pub struct RotatingFileSink {
    path: PathBuf,
    max_size: u64,
    backup_count: usize,
    writer: BufWriter<File>,
    current_size: u64,
}

impl RotatingFileSink {
    /// Open (or create) the log file in append mode
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the active log file
    /// * `max_size` - Rotation threshold in bytes; 0 disables rotation
    /// * `backup_count` - How many numbered backups to keep
    ///
    /// # Errors
    ///
    /// Returns `SinkError::OpenFailed` if the file cannot be opened for
    /// appending.
    pub fn new(
        path: impl Into<PathBuf>,
        max_size: u64,
        backup_count: usize,
    ) -> Result<Self, SinkError> {
        let path = path.into();
        let file = Self::open_append(&path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path,
            max_size,
            backup_count,
            writer: BufWriter::new(file),
            current_size,
        })
    }

    fn open_append(path: &PathBuf) -> Result<File, SinkError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError::OpenFailed {
                path: path.display().to_string(),
                source,
            })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    /// Shift backups up by one and start a fresh file
    fn rotate(&mut self) -> io::Result<()> {
        self.writer.flush()?;

        if self.backup_count > 0 {
            let oldest = self.backup_path(self.backup_count);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for index in (1..self.backup_count).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        } else {
            fs::remove_file(&self.path)?;
        }

        let file = Self::open_append(&self.path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        self.writer = BufWriter::new(file);
        self.current_size = 0;
        debug!("Rotated log file {}", self.path.display());
        Ok(())
    }
}

impl Sink for RotatingFileSink {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let line_size = line.len() as u64 + 1;
        if self.max_size > 0 && self.current_size + line_size > self.max_size {
            self.rotate()?;
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.current_size += line_size;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Non-blocking wrapper around one blocking sink
///
/// Lines are pushed onto a bounded channel consumed by a single worker
/// thread, so delivery order within the sink is enqueue order. When the
/// queue is full the caller writes synchronously instead of blocking on
/// the channel.
pub struct AsyncSink {
    sender: Option<SyncSender<String>>,
    sink: Arc<Mutex<Box<dyn Sink>>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncSink {
    /// Wrap a blocking sink and spawn its worker thread
    ///
    /// # Arguments
    ///
    /// * `sink` - The blocking sink the worker writes to
    /// * `capacity` - Queue bound; a full queue degrades `emit` to a
    ///   synchronous write
    pub fn new(sink: Box<dyn Sink>, capacity: usize) -> Self {
        let sink = Arc::new(Mutex::new(sink));
        let (sender, receiver) = mpsc::sync_channel::<String>(capacity.max(1));

        let worker_sink = Arc::clone(&sink);
        let worker = thread::spawn(move || {
            // recv blocks until the next line or until every sender is
            // dropped, which is the shutdown signal; by then all queued
            // lines have already been received in FIFO order.
            while let Ok(line) = receiver.recv() {
                Self::deliver(&worker_sink, &line);
            }
            let mut guard = match worker_sink.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(e) = guard.flush() {
                eprintln!("lantern: failed to flush sink on shutdown: {}", e);
            }
            debug!("Sink worker finished");
        });

        Self {
            sender: Some(sender),
            sink,
            worker: Some(worker),
        }
    }

    fn deliver(sink: &Arc<Mutex<Box<dyn Sink>>>, line: &str) {
        let mut guard = match sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = guard.write_line(line) {
            // Delivery failures must not crash the worker or the caller
            eprintln!("lantern: failed to write log line: {}", e);
        }
    }

    /// Enqueue a rendered line; falls back to a synchronous write when the
    /// queue is full or the worker has stopped
    pub fn emit(&self, line: String) {
        match &self.sender {
            Some(sender) => match sender.try_send(line) {
                Ok(()) => {}
                Err(TrySendError::Full(line)) | Err(TrySendError::Disconnected(line)) => {
                    Self::deliver(&self.sink, &line);
                }
            },
            None => Self::deliver(&self.sink, &line),
        }
    }

    /// Drain the queue, flush the sink, and join the worker
    pub fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel; the worker keeps
        // receiving until the queue is empty, so nothing is lost.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Sink worker panicked during shutdown");
            }
        }
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}
