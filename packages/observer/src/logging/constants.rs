// packages/observer/src/logging/constants.rs
//! Default constants provider
//!
//! The constants prologue describes the runtime environment that produced
//! the log so offline tooling can interpret the events. Callers may supply
//! their own constants value; this provider fills in a default.

use chrono::Utc;
use serde_json::{json, Value};

/// Version of the on-disk log format
pub const LOG_FORMAT_VERSION: u32 = 1;

/// Build the default constants value written as the log prologue
pub fn default_constants() -> Value {
    json!({
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "captureStartTime": Utc::now().to_rfc3339(),
        "logFormatVersion": LOG_FORMAT_VERSION,
    })
}
