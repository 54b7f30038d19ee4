use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Placeholder for a source file that could not be determined
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// First quoted or bare command-line token naming a report file
static SOURCE_FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)"([^"]+\.(?:pbix|pbit|pbip))"|(?:^|\s)([^\s"]+\.(?:pbix|pbit|pbip))(?:\s|$)"#)
        .expect("Invalid SOURCE_FILE_PATTERN regex")
});

/// Extract the report file a host process was opened with
pub fn source_file_from_command_line(command_line: &str) -> Option<String> {
    let caps = SOURCE_FILE_PATTERN.captures(command_line)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// A discovered (or manually specified) server endpoint
///
/// Immutable once built; a fresh set is produced on every enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceDescriptor {
    process_id: Option<u32>,
    port: u16,
    source_file_path: String,
}

impl InstanceDescriptor {
    /// Create a descriptor
    pub fn new(process_id: Option<u32>, port: u16, source_file_path: impl Into<String>) -> Self {
        Self {
            process_id,
            port,
            source_file_path: source_file_path.into(),
        }
    }

    /// Descriptor for a caller-supplied port, bypassing discovery
    pub fn manual(port: u16) -> Self {
        Self::new(None, port, UNKNOWN_SOURCE)
    }

    /// Host process id; `None` when the endpoint was not tied to a process
    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    /// Server port; 0 means unresolved
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Report file path, or [`UNKNOWN_SOURCE`]
    pub fn source_file_path(&self) -> &str {
        &self.source_file_path
    }

    /// Whether the descriptor carries a usable port
    pub fn is_resolved(&self) -> bool {
        self.port > 0
    }

    /// Base name of the source file
    pub fn display_name(&self) -> &str {
        self.source_file_path
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.source_file_path)
    }
}

impl fmt::Display for InstanceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.process_id {
            Some(pid) => write!(f, "{} (pid {}, port {})", self.display_name(), pid, self.port),
            None => write!(f, "{} (pid unknown, port {})", self.display_name(), self.port),
        }
    }
}
