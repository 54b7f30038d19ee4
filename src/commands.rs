//! Subcommand handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use pbilink_core::diagnostics::Diagnostics;
use pbilink_core::discovery::{InstanceCatalog, InstanceDescriptor};
use pbilink_core::system::{Introspector, ProcfsIntrospector};

use crate::config::Settings;
use crate::monitor::{InstanceChange, WatchMessage, Watcher};
use crate::output;

/// Run a single discovery pass on a blocking worker
pub async fn scan(
    introspector: Arc<dyn Introspector>,
    settings: &Settings,
) -> Result<(Vec<InstanceDescriptor>, Diagnostics)> {
    let options = settings.discovery.to_options();
    let enabled = settings.diagnostics.enabled;

    tokio::task::spawn_blocking(move || {
        let diagnostics = Diagnostics::new(enabled);
        let instances = InstanceCatalog::new(introspector.as_ref(), &options, &diagnostics).list();
        (instances, diagnostics)
    })
    .await
    .context("Discovery task failed")
}

/// `list`: print every discovered instance
pub async fn list(settings: &Settings, json: bool) -> Result<()> {
    let (instances, diagnostics) = scan(Arc::new(ProcfsIntrospector::new()), settings).await?;
    info!("Found {} instance(s)", instances.len());

    if json {
        println!("{}", output::instances_json(&instances)?);
    } else {
        println!("{}", output::instances_table(&instances));
    }

    report_diagnostics(settings, &diagnostics)
}

/// `probe`: check a single port
pub async fn probe(settings: &Settings, port: u16) -> Result<()> {
    if port == 0 {
        bail!("Port must be greater than 0");
    }

    let timeout = Duration::from_millis(settings.discovery.probe_timeout_ms);
    let open = tokio::task::spawn_blocking(move || {
        ProcfsIntrospector::new().probe_connect(port, timeout)
    })
    .await
    .context("Probe task failed")?;

    let descriptor = InstanceCatalog::create_manual(port);
    if open {
        println!("{}: accepting connections", descriptor);
        Ok(())
    } else {
        bail!("{}: no answer within {:?}", descriptor, timeout)
    }
}

/// `watch`: report instances as they appear and disappear
pub async fn watch(settings: &Settings) -> Result<()> {
    let watcher = Watcher::new(
        Arc::new(ProcfsIntrospector::new()),
        settings.discovery.to_options(),
        Duration::from_millis(settings.watch.interval_ms),
    )
    .with_diagnostics(settings.diagnostics.enabled);
    let mut rx = watcher.start();

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(WatchMessage::Scanned { changes, diagnostics, .. }) => {
                    if let Err(e) = report_scan(settings, &changes, &diagnostics) {
                        warn!("Diagnostics export failed: {:#}", e);
                    }
                }
                Some(WatchMessage::Error(e)) => warn!("Watch scan failed: {}", e),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// Print one watch scan's changes, then its diagnostics
fn report_scan(
    settings: &Settings,
    changes: &[InstanceChange],
    diagnostics: &Diagnostics,
) -> Result<()> {
    let now = chrono::Local::now().format("%H:%M:%S");
    for change in changes {
        println!("{} {}", now, output::change_line(change));
    }
    report_diagnostics(settings, diagnostics)
}

/// Print the scan's diagnostics and export them when a path is configured
///
/// In watch mode the export file is rewritten after every scan.
fn report_diagnostics(settings: &Settings, diagnostics: &Diagnostics) -> Result<()> {
    if !settings.diagnostics.enabled {
        return Ok(());
    }

    for line in diagnostics.lines() {
        eprintln!("{}", line);
    }

    if let Some(path) = &settings.diagnostics.export_path {
        let written = diagnostics.export_ndjson(path)?;
        info!("Wrote {} diagnostic event(s) to {:?}", written, path);
    }

    Ok(())
}
