use std::ops::RangeInclusive;
use std::time::Duration;

/// Executable name of the host desktop application
pub const DEFAULT_HOST_PROCESS: &str = "PBIDesktop";

/// Executable name of the embedded analysis server
pub const DEFAULT_SERVER_PROCESS: &str = "msmdsrv";

/// How many generations the ancestor walk may climb
pub const MAX_ANCESTOR_DEPTH: usize = 5;

/// First port of the dynamic/ephemeral range
pub const EPHEMERAL_PORT_START: u16 = 49152;

/// Last port of the dynamic/ephemeral range
pub const EPHEMERAL_PORT_END: u16 = 65535;

/// Upper bound on a single fallback connect probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Tunables for a discovery scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Host application executable name
    pub host_process: String,
    /// Embedded server executable name
    pub server_process: String,
    /// Ancestor walk bound
    pub ancestor_depth: usize,
    /// Connect probe timeout
    pub probe_timeout: Duration,
    /// Port range searched by the fallback scans
    pub ephemeral_range: RangeInclusive<u16>,
    /// Whether probe-based fallback scans run at all
    pub fallback_enabled: bool,
}

impl DiscoveryOptions {
    /// Whether `port` lies in the fallback search range
    pub fn in_ephemeral_range(&self, port: u16) -> bool {
        port > 0 && self.ephemeral_range.contains(&port)
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            host_process: DEFAULT_HOST_PROCESS.to_string(),
            server_process: DEFAULT_SERVER_PROCESS.to_string(),
            ancestor_depth: MAX_ANCESTOR_DEPTH,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            ephemeral_range: EPHEMERAL_PORT_START..=EPHEMERAL_PORT_END,
            fallback_enabled: true,
        }
    }
}
