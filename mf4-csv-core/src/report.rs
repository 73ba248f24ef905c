//! Failure reporting
//!
//! Conversion failures are terminal for one file. The converter hands each
//! one to a [`FailureSink`] as a [`FailureEvent`]; the sink decides where it
//! goes.

use crate::types::{ConvertError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A file that could not be converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub file: String,
    pub kind: ErrorKind,
    pub reason: String,
}

impl FailureEvent {
    pub fn new(file: impl Into<String>, error: &ConvertError) -> Self {
        Self {
            file: file.into(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// Receiver of failure events
pub trait FailureSink: Send + Sync {
    fn report(&self, event: &FailureEvent);
}

/// Forwards failures to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl FailureSink for LogSink {
    fn report(&self, event: &FailureEvent) {
        log::error!("error mf4 file name : {}", event.file);
        log::error!("reason : {}", event.reason);
    }
}

/// Keeps failures in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<FailureEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events reported so far
    pub fn events(&self) -> Vec<FailureEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn into_events(self) -> Vec<FailureEvent> {
        self.events
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FailureSink for MemorySink {
    fn report(&self, event: &FailureEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
