use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostics;
use crate::system::Introspector;

use super::fallback::FallbackScanner;
use super::instance::{source_file_from_command_line, InstanceDescriptor, UNKNOWN_SOURCE};
use super::options::DiscoveryOptions;
use super::resolver::EndpointResolver;

/// Enumerates running host application instances and their server ports
pub struct InstanceCatalog<'a> {
    introspector: &'a dyn Introspector,
    options: &'a DiscoveryOptions,
    diagnostics: &'a Diagnostics,
}

impl<'a> InstanceCatalog<'a> {
    /// Create a catalog over the given introspector
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

    /// Descriptor for a caller-supplied port, bypassing discovery
    pub fn create_manual(port: u16) -> InstanceDescriptor {
        InstanceDescriptor::manual(port)
    }

    /// List every instance with a resolved port
    ///
    /// Never fails: introspection faults only show up in the diagnostics log.
    /// Clears the log first, so afterwards it describes this scan only.
    pub fn list(&self) -> Vec<InstanceDescriptor> {
        self.diagnostics.clear();
        self.diagnostics.log(|| {
            format!(
                "scanning for {} processes (server: {})",
                self.options.host_process, self.options.server_process
            )
        });

        let hosts = match self.introspector.processes_by_name(&self.options.host_process) {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!("Failed to enumerate host processes: {:#}", e);
                self.diagnostics
                    .log(|| format!("host process enumeration failed: {:#}", e));
                Vec::new()
            }
        };
        self.diagnostics
            .log(|| format!("found {} host process(es): {:?}", hosts.len(), hosts));

        let resolver = EndpointResolver::new(self.introspector, self.options, self.diagnostics);
        let fallback = FallbackScanner::new(self.introspector, self.options, self.diagnostics);

        let servers = if hosts.is_empty() {
            Vec::new()
        } else {
            resolver.server_processes()
        };

        // Correlated ports are claimed before any host falls back to probing
        let mut resolved: Vec<(u32, Option<u16>)> = hosts
            .into_iter()
            .map(|host| (host, resolver.resolve_among(host, &servers)))
            .collect();
        let mut claimed: HashSet<u16> = resolved.iter().filter_map(|(_, port)| *port).collect();

        if self.options.fallback_enabled {
            for (host, port) in resolved.iter_mut().filter(|(_, port)| port.is_none()) {
                *port = fallback.scan_for_instance(*host, &claimed, &servers);
                if let Some(port) = port {
                    claimed.insert(*port);
                }
            }
        }

        let mut instances = Vec::new();
        for (host, port) in resolved {
            match port {
                Some(port) => {
                    let source = self.source_file(host);
                    instances.push(InstanceDescriptor::new(Some(host), port, source));
                }
                None => {
                    debug!(host, "Dropping unresolved instance");
                    self.diagnostics
                        .log(|| format!("pid {}: unresolved, dropped", host));
                }
            }
        }

        if instances.is_empty() && self.options.fallback_enabled {
            self.diagnostics
                .log(|| "no correlated instances; scanning ephemeral range".to_string());
            instances = fallback
                .scan_all()
                .into_iter()
                .map(|port| InstanceDescriptor::new(None, port, UNKNOWN_SOURCE))
                .collect();
        }

        if instances.is_empty() {
            self.diagnostics.log(|| "no instances found".to_string());
        } else {
            info!("Discovered {} instance(s)", instances.len());
        }

        instances
    }

    fn source_file(&self, pid: u32) -> String {
        match self.introspector.command_line(pid) {
            Ok(Some(command_line)) => source_file_from_command_line(&command_line)
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            Ok(None) => UNKNOWN_SOURCE.to_string(),
            Err(e) => {
                self.diagnostics
                    .log(|| format!("pid {}: command line query failed: {:#}", pid, e));
                UNKNOWN_SOURCE.to_string()
            }
        }
    }
}
