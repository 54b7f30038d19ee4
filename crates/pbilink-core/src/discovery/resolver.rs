use tracing::{debug, warn};

use crate::diagnostics::Diagnostics;
use crate::system::Introspector;

use super::options::DiscoveryOptions;

/// Maps a host application pid to the port of its embedded server
///
/// Every introspection failure is recorded in the diagnostics log and treated
/// as "no result" for that step. When several servers qualify, the first one
/// in enumeration order wins.
pub struct EndpointResolver<'a> {
    introspector: &'a dyn Introspector,
    options: &'a DiscoveryOptions,
    diagnostics: &'a Diagnostics,
}

impl<'a> EndpointResolver<'a> {
    /// Create a resolver over the given introspector
    pub fn new(
        introspector: &'a dyn Introspector,
        options: &'a DiscoveryOptions,
        diagnostics: &'a Diagnostics,
    ) -> Self {
        Self {
            introspector,
            options,
            diagnostics,
        }
    }

    /// Resolve the port for `host_pid`, enumerating server processes first
    pub fn resolve(&self, host_pid: u32) -> Option<u16> {
        let servers = self.server_processes();
        self.resolve_among(host_pid, &servers)
    }

    /// Resolve the port for `host_pid` against an already enumerated server list
    pub fn resolve_among(&self, host_pid: u32, servers: &[u32]) -> Option<u16> {
        if servers.is_empty() {
            self.diagnostics
                .log(|| format!("pid {}: no {} processes running", host_pid, self.options.server_process));
            return None;
        }

        let server_pid = match self.find_server_for_host(host_pid, servers) {
            Some(pid) => pid,
            None => {
                self.diagnostics.log(|| {
                    format!("pid {}: no server process related to host", host_pid)
                });
                return None;
            }
        };

        let port = self.listening_port(server_pid);
        match port {
            Some(port) => {
                debug!(host_pid, server_pid, port, "Resolved server endpoint");
                self.diagnostics.log(|| {
                    format!(
                        "pid {}: server pid {} listening on port {}",
                        host_pid, server_pid, port
                    )
                });
            }
            None => self.diagnostics.log(|| {
                format!(
                    "pid {}: server pid {} owns no listening socket",
                    host_pid, server_pid
                )
            }),
        }
        port
    }

    /// Pids of all running embedded server processes
    pub fn server_processes(&self) -> Vec<u32> {
        match self.introspector.processes_by_name(&self.options.server_process) {
            Ok(pids) => {
                self.diagnostics.log(|| {
                    format!(
                        "found {} {} process(es): {:?}",
                        pids.len(),
                        self.options.server_process,
                        pids
                    )
                });
                pids
            }
            Err(e) => {
                warn!("Failed to enumerate server processes: {:#}", e);
                self.diagnostics
                    .log(|| format!("server process enumeration failed: {:#}", e));
                Vec::new()
            }
        }
    }

    /// Pick the server process belonging to `host_pid`
    ///
    /// A server descending from the host wins; otherwise the host's own parent
    /// is accepted if it is a server (inverted arrangement).
    pub fn find_server_for_host(&self, host_pid: u32, servers: &[u32]) -> Option<u32> {
        if let Some(server) = servers
            .iter()
            .copied()
            .find(|server| self.is_descendant_of(*server, host_pid))
        {
            self.diagnostics
                .log(|| format!("pid {}: server pid {} is a descendant", host_pid, server));
            return Some(server);
        }

        match self.introspector.parent_of(host_pid) {
            Ok(Some(parent)) if parent > 0 && servers.contains(&parent) => {
                self.diagnostics
                    .log(|| format!("pid {}: parent pid {} is a server", host_pid, parent));
                Some(parent)
            }
            Ok(_) => None,
            Err(e) => {
                self.diagnostics
                    .log(|| format!("pid {}: parent lookup failed: {:#}", host_pid, e));
                None
            }
        }
    }

    /// Whether `ancestor` appears within the bounded parent chain of `pid`
    pub fn is_descendant_of(&self, pid: u32, ancestor: u32) -> bool {
        let mut current = pid;
        for _ in 0..self.options.ancestor_depth {
            match self.introspector.parent_of(current) {
                Ok(Some(parent)) if parent == 0 => return false,
                Ok(Some(parent)) => {
                    if parent == ancestor {
                        return true;
                    }
                    current = parent;
                }
                Ok(None) => return false,
                Err(e) => {
                    self.diagnostics
                        .log(|| format!("pid {}: parent lookup failed: {:#}", current, e));
                    return false;
                }
            }
        }
        false
    }

    /// First listening port owned by `pid`, preferring loopback/wildcard binds
    pub fn listening_port(&self, pid: u32) -> Option<u16> {
        let endpoints = match self.introspector.tcp_endpoints() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("Failed to read socket table: {:#}", e);
                self.diagnostics
                    .log(|| format!("socket table query failed: {:#}", e));
                return None;
            }
        };

        let owned: Vec<_> = endpoints
            .iter()
            .filter(|ep| ep.owning_pid == Some(pid) && ep.is_listening() && ep.local_port > 0)
            .collect();

        owned
            .iter()
            .find(|ep| ep.is_local_bind())
            .or_else(|| owned.first())
            .map(|ep| ep.local_port)
    }
}
