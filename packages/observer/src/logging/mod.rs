// packages/observer/src/logging/mod.rs
//! Event-log capture and persistence
//!
//! This module turns a high-frequency stream of diagnostic events into a
//! single well-formed JSON document on disk:
//!
//! - **Observer**: producer-facing front-end and lifecycle owner
//! - **Write Queue**: bounded FIFO with an oldest-drop overflow policy
//! - **Executor**: dedicated serialized thread for all file I/O
//! - **File Writer**: chunk ring rotation and final-file stitching
//! - **Bus**: the subscription/callback contract with the event source
//! - **Constants**: default prologue describing the runtime environment
//!
//! # Architecture
//!
//! ```text
//! Producers → on_event() → encode → Write Queue ──(flush task)──▶ File Executor
//!                           (hot path, no I/O)                        ↓
//!                                                            chunk ring / final file
//!                                                                     ↓
//!                                                        stop: stitch → one JSON file
//! ```
//!
//! The final file is always a single JSON object
//! `{"constants": ..., "events": [...], "polledData"?: ...}`, valid even
//! after truncation or early termination.

pub mod bus;
pub mod constants;
pub mod entry;
mod executor;
mod file_writer;
pub mod observer;
pub mod write_queue;

/// Sentinel meaning "no size bound"
pub const NO_LIMIT: u64 = u64::MAX;

// Re-export commonly used types
pub use bus::{Bus, CaptureMode, EventBus, EventSink};
pub use constants::{default_constants, LOG_FORMAT_VERSION};
pub use entry::{EventPhase, EventSource, LogEntry, LogEvent};
pub use observer::{FileLogObserver, ObserverOptions, DEFAULT_TOTAL_EVENT_FILES};
pub use write_queue::{QueueStats, WriteQueue};
