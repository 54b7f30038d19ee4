use std::collections::HashMap;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use super::net::{parse_socket_inode, parse_socket_table};
use super::{process_name_matches, Introspector, TcpEndpoint};

/// Introspector backed by a procfs mount
pub struct ProcfsIntrospector {
    /// Root of the procfs tree (normally `/proc`)
    root: PathBuf,
}

impl ProcfsIntrospector {
    /// Create an introspector reading `/proc`
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }

    /// Create an introspector reading a procfs-shaped tree at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    /// All numeric entries under the root
    fn list_pids(&self) -> Result<Vec<u32>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read process table at {:?}", self.root))?;

        let mut pids: Vec<u32> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn read_comm(&self, pid: u32) -> Option<String> {
        fs::read_to_string(self.pid_dir(pid).join("comm"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// argv split on NUL, empty segments dropped
    fn read_argv(&self, pid: u32) -> Option<Vec<String>> {
        let data = fs::read(self.pid_dir(pid).join("cmdline")).ok()?;
        Some(
            data.split(|b| *b == 0)
                .filter(|s| !s.is_empty())
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .collect(),
        )
    }

    /// Map socket inode -> owning pid by walking every readable fd table
    fn socket_owners(&self, pids: &[u32]) -> HashMap<u64, u32> {
        let mut owners = HashMap::new();
        for pid in pids {
            let Ok(entries) = fs::read_dir(self.pid_dir(*pid).join("fd")) else {
                continue;
            };
            for entry in entries.flatten() {
                if let Ok(link) = fs::read_link(entry.path()) {
                    if let Some(inode) = parse_socket_inode(&link.to_string_lossy()) {
                        owners.insert(inode, *pid);
                    }
                }
            }
        }
        owners
    }

    fn read_table(path: &Path, ipv6: bool) -> Result<Vec<super::net::SocketRow>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read socket table {:?}", path))?;
        Ok(parse_socket_table(&content, ipv6))
    }
}

impl Default for ProcfsIntrospector {
    fn default() -> Self {
        Self::new()
    }
}

impl Introspector for ProcfsIntrospector {
    fn processes_by_name(&self, name: &str) -> Result<Vec<u32>> {
        let pids = self.list_pids()?;
        Ok(pids
            .into_iter()
            .filter(|pid| {
                // comm is truncated to 15 bytes, so fall back to argv[0]
                if self
                    .read_comm(*pid)
                    .is_some_and(|comm| process_name_matches(&comm, name))
                {
                    return true;
                }
                self.read_argv(*pid)
                    .and_then(|argv| argv.into_iter().next())
                    .is_some_and(|argv0| process_name_matches(&argv0, name))
            })
            .collect())
    }

    fn parent_of(&self, pid: u32) -> Result<Option<u32>> {
        let path = self.pid_dir(pid).join("stat");
        let stat = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {:?}", path))?;

        // comm may contain spaces and parens; fields resume after the last ')'
        let rest = stat
            .rfind(')')
            .map(|idx| &stat[idx + 1..])
            .with_context(|| format!("Malformed stat for pid {}", pid))?;
        let ppid = rest
            .split_whitespace()
            .nth(1)
            .and_then(|field| field.parse().ok())
            .with_context(|| format!("Missing parent pid in stat for pid {}", pid))?;

        Ok(Some(ppid))
    }

    fn command_line(&self, pid: u32) -> Result<Option<String>> {
        if !self.pid_dir(pid).exists() {
            anyhow::bail!("Process {} not found", pid);
        }
        let Some(argv) = self.read_argv(pid) else {
            return Ok(None);
        };
        if argv.is_empty() {
            return Ok(None);
        }

        let joined = argv
            .iter()
            .map(|arg| {
                if arg.contains(char::is_whitespace) {
                    format!("\"{}\"", arg)
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Some(joined))
    }

    fn tcp_endpoints(&self) -> Result<Vec<TcpEndpoint>> {
        let v4 = Self::read_table(&self.root.join("net").join("tcp"), false);
        let v6 = Self::read_table(&self.root.join("net").join("tcp6"), true);

        let rows = match (v4, v6) {
            (Err(e), Err(_)) => return Err(e),
            (v4, v6) => {
                let mut rows = v4.unwrap_or_default();
                rows.extend(v6.unwrap_or_default());
                rows
            }
        };

        let owners = self.socket_owners(&self.list_pids().unwrap_or_default());

        Ok(rows
            .into_iter()
            .map(|row| TcpEndpoint {
                local_addr: row.local_addr,
                local_port: row.local_port,
                state: row.state,
                owning_pid: owners.get(&row.inode).copied(),
            })
            .collect())
    }

    fn probe_connect(&self, port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, timeout).is_ok()
    }
}
