//! Diagnostics log for discovery scans.
//!
//! The log is an explicit object handed to each scan rather than process-wide
//! state. A catalog enumeration clears it on entry, so the log always holds the
//! evidence of the most recent scan.

mod events;
mod sink;

pub use events::DiagnosticEvent;
pub use sink::Diagnostics;
