use std::collections::HashSet;

use tracing::{debug, warn};

use crate::diagnostics::Diagnostics;
use crate::system::Introspector;

use super::options::DiscoveryOptions;

/// Probe-based discovery over listening ports in the ephemeral range
///
/// A port counts as a server port purely because a connect succeeds; there is
/// no handshake, so an unrelated listener can be picked up.
pub struct FallbackScanner<'a> {
    introspector: &'a dyn Introspector,
    options: &'a DiscoveryOptions,
    diagnostics: &'a Diagnostics,
}

impl<'a> FallbackScanner<'a> {
    /// Create a scanner over the given introspector
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

    /// Find one answering port for a single unresolved host
    ///
    /// Skips ports already claimed during this enumeration and ports owned by
    /// a known process that is not an embedded server.
    pub fn scan_for_instance(
        &self,
        host_pid: u32,
        claimed: &HashSet<u16>,
        servers: &[u32],
    ) -> Option<u16> {
        let candidates = self.listening_ports()?;
        let port = candidates
            .into_iter()
            .filter(|(port, _)| !claimed.contains(port))
            .filter(|(_, owner)| owner.is_none_or(|pid| servers.contains(&pid)))
            .map(|(port, _)| port)
            .find(|port| self.probe(*port));

        match port {
            Some(port) => self
                .diagnostics
                .log(|| format!("pid {}: fallback probe matched port {}", host_pid, port)),
            None => self
                .diagnostics
                .log(|| format!("pid {}: fallback probe found nothing", host_pid)),
        }
        port
    }

    /// Every answering listening port in the range, in socket-table order
    pub fn scan_all(&self) -> Vec<u16> {
        let Some(candidates) = self.listening_ports() else {
            return Vec::new();
        };

        let ports: Vec<u16> = candidates
            .into_iter()
            .map(|(port, _)| port)
            .filter(|port| self.probe(*port))
            .collect();

        self.diagnostics
            .log(|| format!("global fallback matched {} port(s): {:?}", ports.len(), ports));
        ports
    }

    /// Distinct listening ports in the range with their owner, first seen wins
    fn listening_ports(&self) -> Option<Vec<(u16, Option<u32>)>> {
        let endpoints = match self.introspector.tcp_endpoints() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("Fallback scan could not read socket table: {:#}", e);
                self.diagnostics
                    .log(|| format!("fallback socket table query failed: {:#}", e));
                return None;
            }
        };

        let mut seen = HashSet::new();
        let ports: Vec<_> = endpoints
            .into_iter()
            .filter(|ep| ep.is_listening() && self.options.in_ephemeral_range(ep.local_port))
            .filter(|ep| seen.insert(ep.local_port))
            .map(|ep| (ep.local_port, ep.owning_pid))
            .collect();

        self.diagnostics.log(|| {
            format!(
                "{} listening port(s) in {}-{}",
                ports.len(),
                self.options.ephemeral_range.start(),
                self.options.ephemeral_range.end()
            )
        });
        Some(ports)
    }

    fn probe(&self, port: u16) -> bool {
        let answered = self
            .introspector
            .probe_connect(port, self.options.probe_timeout);
        debug!(port, answered, "Connect probe");
        answered
    }
}
