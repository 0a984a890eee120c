// packages/observer/src/lib.rs
//! Bounded rotating JSON event-log observer for network diagnostics.
//!
//! Consumes structured diagnostic events from a busy network stack and
//! persists them to disk as a single well-formed JSON document suitable for
//! offline tooling, without ever blocking the producers.
//!
//! # Architecture
//!
//! - **logging**: observer front-end, write queue, file task executor,
//!   chunk rotation and stitching
//! - **utils**: errors and common helpers
//!
//! # Example
//!
//! ```no_run
//! use netlog_observer::logging::{Bus, CaptureMode, FileLogObserver};
//! use std::sync::Arc;
//!
//! # fn main() -> netlog_observer::utils::Result<()> {
//! let bus = Arc::new(Bus::new());
//! let mut observer = FileLogObserver::bounded("netlog.json", 10 * 1024 * 1024)?;
//! observer.start_observing(bus.clone(), CaptureMode::Default);
//!
//! // ... the network stack emits events through the bus ...
//!
//! observer.stop_observing(None, None);
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod utils;

// Re-export commonly used types
pub use logging::{Bus, CaptureMode, FileLogObserver, LogEntry, LogEvent, ObserverOptions};
pub use utils::errors::{ObserverError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
