// packages/observer/src/logging/executor.rs
//! Serialized file task executor
//!
//! A dedicated thread with a FIFO task queue. Every [`FileWriter`] method
//! runs here, so file state needs no locking and all blocking I/O stays off
//! producer threads. The thread is joined on shutdown so buffered events
//! reach disk before the process exits.

use crate::logging::file_writer::FileWriter;
use crate::logging::write_queue::WriteQueue;
use crate::utils::errors::{ObserverError, Result};
use crossbeam::channel::{self, Receiver, Sender};
use serde_json::Value;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Work items executed in posting order on the writer thread
pub(crate) enum FileTask {
    /// Open the final file and write the constants prologue
    Initialize { constants: Value },

    /// Drain the write queue to disk
    Flush,

    /// Drain, then close the log with the polled-data epilogue.
    /// `on_done` runs after the stop completes.
    FlushThenStop {
        polled_data: Option<Value>,
        on_done: Option<Box<dyn FnOnce() + Send>>,
    },

    /// Close handles and remove everything written so far
    DeleteAllFiles,

    /// Exit the task loop, dropping the writer on its owner thread
    Shutdown,
}

/// Handle to the dedicated writer thread
pub(crate) struct FileTaskRunner {
    sender: Sender<FileTask>,
    handle: Option<JoinHandle<()>>,
}

impl FileTaskRunner {
    /// Spawn the writer thread, moving `writer` onto it
    pub(crate) fn spawn(writer: FileWriter, queue: Arc<WriteQueue>) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();

        let handle = thread::Builder::new()
            .name("netlog-file-writer".to_string())
            .spawn(move || run_task_loop(writer, queue, receiver))
            .map_err(|e| ObserverError::ExecutorStartFailed(e.to_string()))?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Post a task; never blocks
    pub(crate) fn post(&self, task: FileTask) {
        if self.sender.send(task).is_err() {
            error!("file task executor is gone, dropping task");
        }
    }

    /// A sender that producer-side code can use to post tasks
    pub(crate) fn task_sender(&self) -> Sender<FileTask> {
        self.sender.clone()
    }

    /// Post `Shutdown` and block until every previously posted task has
    /// run and the writer thread has exited.
    pub(crate) fn shutdown_and_join(&mut self) {
        let _ = self.sender.send(FileTask::Shutdown);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("file writer thread panicked");
            }
        }
    }
}

fn run_task_loop(mut writer: FileWriter, queue: Arc<WriteQueue>, receiver: Receiver<FileTask>) {
    while let Ok(task) = receiver.recv() {
        match task {
            FileTask::Initialize { constants } => writer.initialize(constants),
            FileTask::Flush => writer.flush(&queue),
            FileTask::FlushThenStop {
                polled_data,
                on_done,
            } => {
                writer.flush_then_stop(&queue, polled_data);
                if let Some(on_done) = on_done {
                    on_done();
                }
            }
            FileTask::DeleteAllFiles => writer.delete_all_files(),
            FileTask::Shutdown => break,
        }
    }

    debug!("file task executor exiting");
    // `writer` is dropped here, closing any remaining handles on the
    // thread that owns them.
}
