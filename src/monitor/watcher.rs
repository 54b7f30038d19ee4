use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use pbilink_core::diagnostics::Diagnostics;
use pbilink_core::discovery::{DiscoveryOptions, InstanceCatalog, InstanceDescriptor};
use pbilink_core::system::Introspector;

/// Difference between two consecutive scans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceChange {
    Appeared(InstanceDescriptor),
    Disappeared(InstanceDescriptor),
}

/// Message sent from the watcher to the main loop
#[derive(Debug)]
pub enum WatchMessage {
    /// A scan finished; `changes` is empty when nothing moved
    Scanned {
        instances: Vec<InstanceDescriptor>,
        changes: Vec<InstanceChange>,
        diagnostics: Diagnostics,
    },
    /// The scan task itself failed
    Error(String),
}

/// Compare two scans; disappearances come first
pub fn diff(previous: &[InstanceDescriptor], current: &[InstanceDescriptor]) -> Vec<InstanceChange> {
    let before: HashSet<&InstanceDescriptor> = previous.iter().collect();
    let after: HashSet<&InstanceDescriptor> = current.iter().collect();

    let gone = previous
        .iter()
        .filter(|i| !after.contains(i))
        .cloned()
        .map(InstanceChange::Disappeared);
    let new = current
        .iter()
        .filter(|i| !before.contains(i))
        .cloned()
        .map(InstanceChange::Appeared);

    gone.chain(new).collect()
}

/// Periodically re-runs discovery in a background task
pub struct Watcher {
    introspector: Arc<dyn Introspector>,
    options: DiscoveryOptions,
    interval: Duration,
    diagnostics: bool,
}

impl Watcher {
    /// Create a new watcher
    pub fn new(
        introspector: Arc<dyn Introspector>,
        options: DiscoveryOptions,
        interval: Duration,
    ) -> Self {
        Self {
            introspector,
            options,
            interval,
            diagnostics: false,
        }
    }

    /// Record a diagnostics log for every scan
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Start watching in a background task
    pub fn start(self) -> mpsc::Receiver<WatchMessage> {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            self.run(tx).await;
        });

        rx
    }

    async fn run(self, tx: mpsc::Sender<WatchMessage>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous: Vec<InstanceDescriptor> = Vec::new();

        loop {
            ticker.tick().await;

            let message = match self.scan_once().await {
                Ok((instances, diagnostics)) => {
                    let changes = diff(&previous, &instances);
                    if !changes.is_empty() {
                        debug!("Instance set changed: {} change(s)", changes.len());
                    }
                    previous = instances.clone();
                    WatchMessage::Scanned {
                        instances,
                        changes,
                        diagnostics,
                    }
                }
                Err(e) => {
                    warn!("Scan task failed: {}", e);
                    WatchMessage::Error(e.to_string())
                }
            };

            if tx.send(message).await.is_err() {
                break; // Receiver dropped
            }
        }
    }

    /// Discovery blocks on probes, so it runs off the async workers
    async fn scan_once(
        &self,
    ) -> Result<(Vec<InstanceDescriptor>, Diagnostics), tokio::task::JoinError> {
        let introspector = Arc::clone(&self.introspector);
        let options = self.options.clone();
        let enabled = self.diagnostics;

        tokio::task::spawn_blocking(move || {
            let diagnostics = Diagnostics::new(enabled);
            let instances =
                InstanceCatalog::new(introspector.as_ref(), &options, &diagnostics).list();
            (instances, diagnostics)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbilink_core::system::FixtureIntrospector;
    use pretty_assertions::assert_eq;

    fn descriptor(pid: u32, port: u16) -> InstanceDescriptor {
        InstanceDescriptor::new(Some(pid), port, "Unknown")
    }

    #[test]
    fn test_diff_no_change() {
        let scan = vec![descriptor(1, 50000)];
        assert!(diff(&scan, &scan).is_empty());
    }

    #[test]
    fn test_diff_appeared_and_disappeared() {
        let previous = vec![descriptor(1, 50000), descriptor(2, 50001)];
        let current = vec![descriptor(2, 50001), descriptor(3, 50002)];

        assert_eq!(
            diff(&previous, &current),
            vec![
                InstanceChange::Disappeared(descriptor(1, 50000)),
                InstanceChange::Appeared(descriptor(3, 50002)),
            ]
        );
    }

    #[test]
    fn test_diff_port_change_is_replacement() {
        let previous = vec![descriptor(1, 50000)];
        let current = vec![descriptor(1, 50010)];

        assert_eq!(diff(&previous, &current).len(), 2);
    }

    #[tokio::test]
    async fn test_first_scan_reports_everything() {
        let fixture = FixtureIntrospector::new()
            .with_process(100, 1, "PBIDesktop", "PBIDesktop.exe")
            .with_process(200, 100, "msmdsrv", "msmdsrv.exe")
            .with_listener(Some(200), 51000);

        let watcher = Watcher::new(
            Arc::new(fixture),
            DiscoveryOptions::default(),
            Duration::from_millis(10),
        )
        .with_diagnostics(true);
        let mut rx = watcher.start();

        match rx.recv().await {
            Some(WatchMessage::Scanned {
                instances,
                changes,
                diagnostics,
            }) => {
                assert_eq!(instances.len(), 1);
                assert_eq!(instances[0].port(), 51000);
                assert_eq!(changes, vec![InstanceChange::Appeared(instances[0].clone())]);
                assert!(!diagnostics.is_empty());
            }
            other => panic!("unexpected message: {:?}", other),
        }

        // Nothing moves between scans of a static fixture
        match rx.recv().await {
            Some(WatchMessage::Scanned { changes, .. }) => assert!(changes.is_empty()),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_system() {
        let watcher = Watcher::new(
            Arc::new(FixtureIntrospector::new()),
            DiscoveryOptions::default(),
            Duration::from_millis(10),
        );
        let mut rx = watcher.start();

        match rx.recv().await {
            Some(WatchMessage::Scanned {
                instances,
                diagnostics,
                ..
            }) => {
                assert!(instances.is_empty());
                assert!(diagnostics.is_empty());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
