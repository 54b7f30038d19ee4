//! In-memory process and socket tables.
//!
//! Used by tests and by the CLI demo mode to stand in for a live system.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use super::{process_name_matches, Introspector, TcpEndpoint, TcpState};

#[derive(Debug, Clone)]
struct FixtureProcess {
    parent: u32,
    name: String,
    command_line: Option<String>,
}

/// Synthetic introspector with a fixed process table and socket table
#[derive(Debug, Clone, Default)]
pub struct FixtureIntrospector {
    processes: BTreeMap<u32, FixtureProcess>,
    endpoints: Vec<TcpEndpoint>,
    answering: BTreeSet<u16>,
    process_table_unavailable: bool,
    socket_table_unavailable: bool,
    probed: Arc<Mutex<Vec<u16>>>,
}

impl FixtureIntrospector {
    /// Create an empty fixture
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process
    pub fn with_process(mut self, pid: u32, parent: u32, name: &str, command_line: &str) -> Self {
        self.processes.insert(
            pid,
            FixtureProcess {
                parent,
                name: name.to_string(),
                command_line: (!command_line.is_empty()).then(|| command_line.to_string()),
            },
        );
        self
    }

    /// Add a loopback listener that answers connect probes
    pub fn with_listener(mut self, owner: Option<u32>, port: u16) -> Self {
        self.push_endpoint(owner, IpAddr::V4(Ipv4Addr::LOCALHOST), port, TcpState::Listen);
        self.answering.insert(port);
        self
    }

    /// Add a listener on an arbitrary address that answers connect probes
    pub fn with_listener_on(mut self, owner: Option<u32>, addr: IpAddr, port: u16) -> Self {
        self.push_endpoint(owner, addr, port, TcpState::Listen);
        self.answering.insert(port);
        self
    }

    /// Add a listener whose probes time out (e.g. firewalled)
    pub fn with_silent_listener(mut self, owner: Option<u32>, port: u16) -> Self {
        self.push_endpoint(owner, IpAddr::V4(Ipv4Addr::LOCALHOST), port, TcpState::Listen);
        self
    }

    /// Add an established connection endpoint
    pub fn with_established(mut self, owner: Option<u32>, port: u16) -> Self {
        self.push_endpoint(owner, IpAddr::V4(Ipv4Addr::LOCALHOST), port, TcpState::Established);
        self
    }

    /// Make every process-table query fail
    pub fn without_process_table(mut self) -> Self {
        self.process_table_unavailable = true;
        self
    }

    /// Make every socket-table query fail
    pub fn without_socket_table(mut self) -> Self {
        self.socket_table_unavailable = true;
        self
    }

    /// Ports probed so far, in probe order
    pub fn probed_ports(&self) -> Vec<u16> {
        self.probed.lock().clone()
    }

    fn push_endpoint(&mut self, owner: Option<u32>, addr: IpAddr, port: u16, state: TcpState) {
        self.endpoints.push(TcpEndpoint {
            local_addr: addr,
            local_port: port,
            state,
            owning_pid: owner,
        });
    }

    fn process(&self, pid: u32) -> Result<&FixtureProcess> {
        if self.process_table_unavailable {
            return Err(anyhow!("process table unavailable"));
        }
        self.processes
            .get(&pid)
            .ok_or_else(|| anyhow!("Process {} not found", pid))
    }
}

impl Introspector for FixtureIntrospector {
    fn processes_by_name(&self, name: &str) -> Result<Vec<u32>> {
        if self.process_table_unavailable {
            return Err(anyhow!("process table unavailable"));
        }
        Ok(self
            .processes
            .iter()
            .filter(|(_, process)| process_name_matches(&process.name, name))
            .map(|(pid, _)| *pid)
            .collect())
    }

    fn parent_of(&self, pid: u32) -> Result<Option<u32>> {
        Ok(Some(self.process(pid)?.parent))
    }

    fn command_line(&self, pid: u32) -> Result<Option<String>> {
        Ok(self.process(pid)?.command_line.clone())
    }

    fn tcp_endpoints(&self) -> Result<Vec<TcpEndpoint>> {
        if self.socket_table_unavailable {
            return Err(anyhow!("socket table unavailable"));
        }
        Ok(self.endpoints.clone())
    }

    fn probe_connect(&self, port: u16, _timeout: Duration) -> bool {
        self.probed.lock().push(port);
        self.answering.contains(&port)
    }
}
