use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use super::events::DiagnosticEvent;

/// Toggleable, append-only diagnostics log
///
/// When disabled, `log` is a no-op and the message closure is never called.
#[derive(Debug, Default)]
pub struct Diagnostics {
    enabled: AtomicBool,
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl Diagnostics {
    /// Create a new log with the given toggle state
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Turn recording on or off. Already recorded events are kept.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether events are currently being recorded
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Record an event
    pub fn log<F>(&self, message: F)
    where
        F: FnOnce() -> String,
    {
        if !self.is_enabled() {
            return;
        }

        let message = message();
        tracing::debug!(target: "pbilink_core::diagnostics", "{}", message);
        self.events.lock().push(DiagnosticEvent::new(message));
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Snapshot of the recorded events, oldest first
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// Recorded events rendered as text lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.events.lock().iter().map(DiagnosticEvent::render).collect()
    }

    /// Get the number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Write the current log to `path` in ndjson format
    ///
    /// Returns the number of events written.
    pub fn export_ndjson(&self, path: &Path) -> Result<usize> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).with_context(|| {
                    format!("Failed to create diagnostics directory: {:?}", dir)
                })?;
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create diagnostics file: {:?}", path))?;
        let mut writer = BufWriter::new(file);

        let events = self.events();
        for event in &events {
            let json = serde_json::to_string(event)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        Ok(events.len())
    }
}
