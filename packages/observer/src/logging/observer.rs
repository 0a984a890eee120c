// packages/observer/src/logging/observer.rs
//! Observer front-end
//!
//! `FileLogObserver` is what callers hold: it subscribes to an event bus,
//! encodes each event on the producer's thread, and hands the encoded
//! strings to the write queue. A dedicated file task executor does all the
//! I/O, so producers never block on disk.

use crate::logging::bus::{CaptureMode, EventBus, EventSink};
use crate::logging::constants::default_constants;
use crate::logging::entry::LogEvent;
use crate::logging::executor::{FileTask, FileTaskRunner};
use crate::logging::file_writer::FileWriter;
use crate::logging::write_queue::{QueueStats, WriteQueue};
use crate::logging::NO_LIMIT;
use crate::utils::errors::{ObserverError, Result};
use crossbeam::channel::Sender;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Queue length at which a drain task is posted to the file executor.
///
/// The trigger fires only when the post-push length *equals* the threshold:
/// the length crosses it exactly once per drain cycle, so at most one flush
/// task is outstanding between drains.
const FLUSH_QUEUE_LEN: usize = 15;

/// Default number of chunk files in the ring (bounded mode)
pub const DEFAULT_TOTAL_EVENT_FILES: usize = 10;

/// Constructor-level configuration
#[derive(Debug, Clone)]
pub struct ObserverOptions {
    /// Total disk budget for event chunks. `None` selects unbounded mode.
    pub max_total_size: Option<u64>,

    /// Number of chunk files in the ring; only meaningful in bounded mode
    pub total_event_files: usize,

    /// Constants value written as the log prologue; defaults from
    /// [`default_constants`] when `None`
    pub constants: Option<Value>,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            max_total_size: None,
            total_event_files: DEFAULT_TOTAL_EVENT_FILES,
            constants: None,
        }
    }
}

/// The bus-facing half of the observer: encodes events and feeds the
/// write queue. Shared with the bus as an `Arc<dyn EventSink>`.
struct QueueSink {
    write_queue: Arc<WriteQueue>,
    tasks: Sender<FileTask>,
}

impl QueueSink {
    fn encode(event: &dyn LogEvent) -> Result<String> {
        serde_json::to_string(&event.to_value())
            .map_err(|e| ObserverError::EncodeFailed(e.to_string()))
    }
}

impl EventSink for QueueSink {
    fn on_event(&self, event: &dyn LogEvent) {
        // An event that cannot be encoded is dropped.
        let Ok(json) = Self::encode(event) else {
            return;
        };

        let queue_len = self.write_queue.push(json);

        // Only one push can equal the threshold between drains, so
        // redundant flush tasks are suppressed.
        if queue_len == FLUSH_QUEUE_LEN {
            let _ = self.tasks.send(FileTask::Flush);
        }
    }
}

/// Persists a stream of diagnostic events as a single well-formed JSON
/// document.
///
/// In bounded mode disk usage is capped: events rotate through a fixed
/// ring of chunk files and the newest window is stitched into the final
/// file on stop. In unbounded mode events stream straight into the final
/// file.
///
/// Dropping the observer without calling [`stop_observing`] deletes all
/// log files; either way the drop joins the writer thread so pending work
/// finishes before the process exits.
///
/// [`stop_observing`]: FileLogObserver::stop_observing
pub struct FileLogObserver {
    runner: FileTaskRunner,
    write_queue: Arc<WriteQueue>,
    sink: Arc<QueueSink>,
    bus: Option<Arc<dyn EventBus>>,
    stopped: bool,
}

impl FileLogObserver {
    /// Observer with a total disk budget, using the default ring size
    pub fn bounded(log_path: impl Into<PathBuf>, max_total_size: u64) -> Result<Self> {
        Self::with_options(
            log_path,
            ObserverOptions {
                max_total_size: Some(max_total_size),
                ..Default::default()
            },
        )
    }

    /// Observer with a total disk budget spread over `total_event_files`
    /// chunk files
    pub fn bounded_with_file_count(
        log_path: impl Into<PathBuf>,
        max_total_size: u64,
        total_event_files: usize,
    ) -> Result<Self> {
        Self::with_options(
            log_path,
            ObserverOptions {
                max_total_size: Some(max_total_size),
                total_event_files,
                constants: None,
            },
        )
    }

    /// Observer without any disk bound
    pub fn unbounded(log_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(log_path, ObserverOptions::default())
    }

    /// Observer with explicit options
    pub fn with_options(log_path: impl Into<PathBuf>, options: ObserverOptions) -> Result<Self> {
        assert!(
            options.total_event_files > 0,
            "total_event_files must be nonzero"
        );

        let log_path = log_path.into();

        // The writer enforces a soft per-chunk limit while the queue cap is
        // hard, so the queue gets twice the total budget: enough head-room
        // for the writer to fill every chunk before events start dropping.
        let (max_event_file_size, queue_memory_max) = match options.max_total_size {
            Some(total) => (
                total / options.total_event_files as u64,
                total.saturating_mul(2),
            ),
            None => (NO_LIMIT, NO_LIMIT),
        };

        let write_queue = Arc::new(WriteQueue::new(queue_memory_max));
        let writer = FileWriter::new(
            log_path.clone(),
            max_event_file_size,
            options.total_event_files,
        );
        let runner = FileTaskRunner::spawn(writer, Arc::clone(&write_queue))?;

        let constants = options.constants.unwrap_or_else(default_constants);
        runner.post(FileTask::Initialize { constants });

        info!(
            path = %log_path.display(),
            bounded = options.max_total_size.is_some(),
            "file log observer started"
        );

        let sink = Arc::new(QueueSink {
            write_queue: Arc::clone(&write_queue),
            tasks: runner.task_sender(),
        });

        Ok(Self {
            runner,
            write_queue,
            sink,
            bus: None,
            stopped: false,
        })
    }

    /// Subscribe to `bus` at the given verbosity. The observer must not
    /// already be subscribed.
    pub fn start_observing(&mut self, bus: Arc<dyn EventBus>, mode: CaptureMode) {
        debug_assert!(self.bus.is_none(), "already observing a bus");

        bus.add_observer(Arc::clone(&self.sink) as Arc<dyn EventSink>, mode);
        self.bus = Some(bus);
    }

    /// Record one event. Hot path, callable from any thread; never blocks
    /// on I/O and never fails from the caller's perspective.
    pub fn on_event(&self, event: &dyn LogEvent) {
        self.sink.on_event(event);
    }

    /// Unsubscribe from the bus, then flush and close the log.
    ///
    /// Unsubscription is synchronous: once this returns, no further
    /// `on_event` dispatch from the bus can race with the stop. `on_done`
    /// (if given) runs on the file task executor after the stop task
    /// completes. Calling stop a second time is a no-op.
    pub fn stop_observing(
        &mut self,
        polled_data: Option<Value>,
        on_done: Option<Box<dyn FnOnce() + Send>>,
    ) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Some(bus) = self.bus.take() {
            bus.remove_observer(&(Arc::clone(&self.sink) as Arc<dyn EventSink>));
        }

        self.runner.post(FileTask::FlushThenStop {
            polled_data,
            on_done,
        });
    }

    /// Snapshot of write-queue counters
    pub fn queue_stats(&self) -> QueueStats {
        self.write_queue.stats()
    }
}

impl Drop for FileLogObserver {
    fn drop(&mut self) {
        if !self.stopped {
            // Stop was never called: tear the log off disk rather than
            // leave a file that never got its closing epilogue.
            if let Some(bus) = self.bus.take() {
                bus.remove_observer(&(Arc::clone(&self.sink) as Arc<dyn EventSink>));
            }
            self.runner.post(FileTask::DeleteAllFiles);
        }

        // Blocks until all posted work (including a pending stop) has run;
        // the writer itself is dropped on the executor thread.
        self.runner.shutdown_and_join();
    }
}
