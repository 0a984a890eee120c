// packages/observer/src/logging/bus.rs
//! Event bus contract
//!
//! The bus that produces events lives outside this crate; only the
//! subscription and callback contract is fixed here. A minimal in-memory
//! `Bus` is provided so the observer can be exercised end to end.

use crate::logging::entry::LogEvent;
use std::sync::{Arc, Mutex, PoisonError};

/// Verbosity requested by an observer at subscription time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Default capture: no sensitive data
    #[default]
    Default,

    /// Additionally capture sensitive data (cookies, credentials)
    IncludeSensitive,

    /// Capture everything, including raw byte transfers
    Everything,
}

/// Receiver of events. Called from arbitrary threads, possibly concurrently.
pub trait EventSink: Send + Sync {
    /// Deliver one event to the sink
    fn on_event(&self, event: &dyn LogEvent);
}

/// Subscription surface of an event bus.
///
/// `remove_observer` is synchronous: once it returns, no new dispatch to
/// that sink begins.
pub trait EventBus: Send + Sync {
    /// Register a sink at the given verbosity. A sink must not be
    /// registered twice.
    fn add_observer(&self, sink: Arc<dyn EventSink>, mode: CaptureMode);

    /// Unregister a previously registered sink
    fn remove_observer(&self, sink: &Arc<dyn EventSink>);
}

/// Minimal in-memory event bus.
///
/// Dispatch holds the observer-list lock, which is what makes
/// `remove_observer` synchronous with respect to `emit`.
#[derive(Default)]
pub struct Bus {
    observers: Mutex<Vec<(Arc<dyn EventSink>, CaptureMode)>>,
}

impl Bus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every registered sink
    pub fn emit(&self, event: &dyn LogEvent) {
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (sink, _mode) in observers.iter() {
            sink.on_event(event);
        }
    }

    /// Number of registered sinks
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EventBus for Bus {
    fn add_observer(&self, sink: Arc<dyn EventSink>, mode: CaptureMode) {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        debug_assert!(
            !observers.iter().any(|(s, _)| Arc::ptr_eq(s, &sink)),
            "sink registered twice"
        );
        observers.push((sink, mode));
    }

    fn remove_observer(&self, sink: &Arc<dyn EventSink>) {
        let mut observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        observers.retain(|(s, _)| !Arc::ptr_eq(s, sink));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        seen: AtomicUsize,
    }

    impl EventSink for CountingSink {
        fn on_event(&self, _event: &dyn LogEvent) {
            self.seen.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_add_emit_remove() {
        let bus = Bus::new();
        let sink = Arc::new(CountingSink {
            seen: AtomicUsize::new(0),
        });

        let dyn_sink: Arc<dyn EventSink> = sink.clone();
        bus.add_observer(dyn_sink.clone(), CaptureMode::Default);
        assert_eq!(bus.observer_count(), 1);

        bus.emit(&json!({"a": 1}));
        bus.emit(&json!({"a": 2}));
        assert_eq!(sink.seen.load(Ordering::Relaxed), 2);

        bus.remove_observer(&dyn_sink);
        assert_eq!(bus.observer_count(), 0);

        bus.emit(&json!({"a": 3}));
        assert_eq!(sink.seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_emit_with_no_observers() {
        let bus = Bus::new();
        bus.emit(&Value::Null);
    }
}
