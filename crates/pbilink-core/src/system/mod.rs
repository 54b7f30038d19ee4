//! OS introspection seam.
//!
//! Discovery never reads the process or socket tables directly; it goes
//! through [`Introspector`] so that the `/proc` reader can be swapped for a
//! synthetic fixture.

mod fixture;
mod net;
mod procfs;

use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

pub use fixture::FixtureIntrospector;
pub use procfs::ProcfsIntrospector;

/// TCP connection state, reduced to what discovery cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TcpState {
    Listen,
    Established,
    Other,
}

/// A local TCP endpoint from the socket table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpEndpoint {
    /// Local bind address
    pub local_addr: IpAddr,
    /// Local port
    pub local_port: u16,
    /// Connection state
    pub state: TcpState,
    /// Owning process, if the OS let us see it
    pub owning_pid: Option<u32>,
}

impl TcpEndpoint {
    /// Whether this endpoint is a listening socket
    pub fn is_listening(&self) -> bool {
        self.state == TcpState::Listen
    }

    /// Whether the endpoint is bound to a loopback or wildcard address
    pub fn is_local_bind(&self) -> bool {
        match self.local_addr {
            IpAddr::V4(v4) => v4.is_loopback() || v4.is_unspecified(),
            IpAddr::V6(v6) => {
                v6.is_loopback()
                    || v6.is_unspecified()
                    || v6
                        .to_ipv4_mapped()
                        .is_some_and(|v4| v4.is_loopback() || v4.is_unspecified())
            }
        }
    }
}

/// Read access to the process table and the TCP socket table
pub trait Introspector: Send + Sync {
    /// Pids of all processes whose executable name matches `name`, in
    /// enumeration order
    fn processes_by_name(&self, name: &str) -> Result<Vec<u32>>;

    /// Parent pid of `pid`; fails if the process does not exist
    fn parent_of(&self, pid: u32) -> Result<Option<u32>>;

    /// Full command line of `pid`, if readable
    fn command_line(&self, pid: u32) -> Result<Option<String>>;

    /// All local TCP endpoints (listening and established)
    fn tcp_endpoints(&self) -> Result<Vec<TcpEndpoint>>;

    /// Blocking connect to `127.0.0.1:port`, bounded by `timeout`
    fn probe_connect(&self, port: u16, timeout: Duration) -> bool;
}

/// Compare an executable name against a wanted process name
///
/// Case-insensitive, ignores a trailing `.exe` and any leading directory.
pub fn process_name_matches(candidate: &str, wanted: &str) -> bool {
    fn normalize(name: &str) -> &str {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        match base.len().checked_sub(4) {
            Some(cut) if base.is_char_boundary(cut) && base[cut..].eq_ignore_ascii_case(".exe") => {
                &base[..cut]
            }
            _ => base,
        }
    }

    let candidate = normalize(candidate.trim());
    let wanted = normalize(wanted.trim());
    !wanted.is_empty() && candidate.eq_ignore_ascii_case(wanted)
}
