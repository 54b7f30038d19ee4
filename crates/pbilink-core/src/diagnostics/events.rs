use chrono::{DateTime, Local};
use serde::Serialize;

/// A single timestamped diagnostic entry
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    /// When the event was recorded (sub-second resolution)
    pub ts: DateTime<Local>,
    /// Free-form message
    pub message: String,
}

impl DiagnosticEvent {
    /// Create an event stamped with the current local time
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ts: Local::now(),
            message: message.into(),
        }
    }

    /// Render as `HH:MM:SS.mmm message`
    pub fn render(&self) -> String {
        format!("{} {}", self.ts.format("%H:%M:%S%.3f"), self.message)
    }
}
