//! Endpoint discovery.
//!
//! Three descending levels of confidence:
//! 1. exact correlation: host pid → embedded server pid → owned listening port
//! 2. per-instance probe of listening ephemeral ports
//! 3. global probe of every listening ephemeral port

mod catalog;
mod fallback;
mod instance;
mod options;
mod resolver;

pub use catalog::InstanceCatalog;
pub use fallback::FallbackScanner;
pub use instance::{source_file_from_command_line, InstanceDescriptor, UNKNOWN_SOURCE};
pub use options::{
    DiscoveryOptions, DEFAULT_HOST_PROCESS, DEFAULT_PROBE_TIMEOUT, DEFAULT_SERVER_PROCESS,
    EPHEMERAL_PORT_END, EPHEMERAL_PORT_START, MAX_ANCESTOR_DEPTH,
};
pub use resolver::EndpointResolver;
