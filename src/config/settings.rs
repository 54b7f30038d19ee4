use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use pbilink_core::discovery::{
    DiscoveryOptions, DEFAULT_HOST_PROCESS, DEFAULT_SERVER_PROCESS, EPHEMERAL_PORT_END,
    EPHEMERAL_PORT_START, MAX_ANCESTOR_DEPTH,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Locate Power BI Desktop's embedded analysis server"
)]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Record discovery diagnostics and print them after each scan
    #[arg(long, global = true)]
    pub diagnostics: bool,

    /// Host application process name
    #[arg(long, global = true)]
    pub host_process: Option<String>,

    /// Embedded server process name
    #[arg(long, global = true)]
    pub server_process: Option<String>,

    /// Connect probe timeout in milliseconds
    #[arg(long, global = true)]
    pub probe_timeout: Option<u64>,

    /// Disable probe-based fallback discovery
    #[arg(long, global = true)]
    pub no_fallback: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List running instances and their server ports (default)
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check whether a local port accepts connections
    Probe {
        /// Port to probe
        port: u16,
    },
    /// Re-scan periodically and report instances as they come and go
    Watch {
        /// Scan interval in milliseconds
        #[arg(short = 'i', long)]
        interval: Option<u64>,
    },
    /// Run discovery and model editing against a simulated server
    Demo,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run, `list` when none was given
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::List { json: false })
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Discovery settings
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Diagnostics log settings
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchSettings,
}

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Host application process name
    #[serde(default = "default_host_process")]
    pub host_process: String,

    /// Embedded server process name
    #[serde(default = "default_server_process")]
    pub server_process: String,

    /// Ancestor walk bound
    #[serde(default = "default_ancestor_depth")]
    pub ancestor_depth: usize,

    /// Connect probe timeout in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// First port searched by fallback scans
    #[serde(default = "default_ephemeral_start")]
    pub ephemeral_start: u16,

    /// Last port searched by fallback scans
    #[serde(default = "default_ephemeral_end")]
    pub ephemeral_end: u16,

    /// Run probe-based fallback scans
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,
}

fn default_host_process() -> String {
    DEFAULT_HOST_PROCESS.to_string()
}

fn default_server_process() -> String {
    DEFAULT_SERVER_PROCESS.to_string()
}

fn default_ancestor_depth() -> usize {
    MAX_ANCESTOR_DEPTH
}

fn default_probe_timeout() -> u64 {
    100
}

fn default_ephemeral_start() -> u16 {
    EPHEMERAL_PORT_START
}

fn default_ephemeral_end() -> u16 {
    EPHEMERAL_PORT_END
}

fn default_fallback_enabled() -> bool {
    true
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            host_process: default_host_process(),
            server_process: default_server_process(),
            ancestor_depth: default_ancestor_depth(),
            probe_timeout_ms: default_probe_timeout(),
            ephemeral_start: default_ephemeral_start(),
            ephemeral_end: default_ephemeral_end(),
            fallback_enabled: default_fallback_enabled(),
        }
    }
}

impl DiscoverySettings {
    /// Convert into the options consumed by the discovery engine
    pub fn to_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            host_process: self.host_process.clone(),
            server_process: self.server_process.clone(),
            ancestor_depth: self.ancestor_depth,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            ephemeral_range: self.ephemeral_start..=self.ephemeral_end,
            fallback_enabled: self.fallback_enabled,
        }
    }
}

/// Diagnostics log settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsSettings {
    /// Record diagnostics during scans
    #[serde(default)]
    pub enabled: bool,

    /// Write each scan's diagnostics here as ndjson
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

/// Watch mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Scan interval in milliseconds
    #[serde(default = "default_watch_interval")]
    pub interval_ms: u64,
}

fn default_watch_interval() -> u64 {
    2000
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_watch_interval(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // An explicit path must exist
        if let Some(p) = path {
            if !p.exists() {
                bail!("Config file not found: {:?}", p);
            }
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file: {:?}", p))?;
            return toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", p));
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("pbilink/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/pbilink/config.toml")),
            dirs::home_dir().map(|p| p.join(".pbilink.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if cli.diagnostics {
            self.diagnostics.enabled = true;
        }
        if let Some(host) = &cli.host_process {
            self.discovery.host_process = host.clone();
        }
        if let Some(server) = &cli.server_process {
            self.discovery.server_process = server.clone();
        }
        if let Some(timeout) = cli.probe_timeout {
            self.discovery.probe_timeout_ms = timeout;
        }
        if cli.no_fallback {
            self.discovery.fallback_enabled = false;
        }
        if let Some(Command::Watch {
            interval: Some(interval),
        }) = &cli.command
        {
            self.watch.interval_ms = *interval;
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        const MIN_PROBE_TIMEOUT: u64 = 1;
        const MIN_WATCH_INTERVAL: u64 = 100;

        let discovery = &mut self.discovery;
        if discovery.probe_timeout_ms < MIN_PROBE_TIMEOUT {
            discovery.probe_timeout_ms = MIN_PROBE_TIMEOUT;
        }
        if discovery.ancestor_depth == 0 {
            discovery.ancestor_depth = 1;
        }
        if discovery.ephemeral_start == 0 {
            discovery.ephemeral_start = 1;
        }
        if discovery.ephemeral_start > discovery.ephemeral_end {
            std::mem::swap(&mut discovery.ephemeral_start, &mut discovery.ephemeral_end);
        }
        if self.watch.interval_ms < MIN_WATCH_INTERVAL {
            self.watch.interval_ms = MIN_WATCH_INTERVAL;
        }
    }
}
