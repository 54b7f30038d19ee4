//! Demo mode: discovery and model editing against a simulated system.
//!
//! Two host instances run on a synthetic process table. The first owns its
//! server as a child process; the second was launched by its server. An
//! in-memory model server answers on both ports.

mod scenario;

use std::sync::Arc;

use anyhow::Result;

use pbilink_core::api::{PbiCore, PbiCoreBuilder};
use pbilink_core::discovery::DiscoveryOptions;
use pbilink_core::model::{DataType, RefreshKind};

use crate::config::Settings;
use crate::output;

pub use scenario::{DemoScenario, INVENTORY_PORT, SALES_PORT};

/// Run the demo and print its transcript
pub fn run(settings: &Settings) -> Result<()> {
    let scenario = DemoScenario::build();
    let mut core = scenario.core(settings);

    for line in play(&mut core)? {
        println!("{}", line);
    }

    if settings.diagnostics.enabled {
        for line in core.diagnostic_log() {
            eprintln!("{}", line);
        }
    }

    Ok(())
}

/// Walk the scenario, returning what happened line by line
pub fn play(core: &mut PbiCore) -> Result<Vec<String>> {
    let mut transcript = Vec::new();

    let instances = core.list_instances();
    transcript.push(format!("Discovered {} instance(s):", instances.len()));
    transcript.extend(output::instances_table(&instances).lines().map(str::to_string));

    let first = core.connect_first_available()?;
    transcript.push(format!("Connected to {}", first));
    for table in core.tables()? {
        transcript.push(format!(
            "  table {} ({} columns, {} measures)",
            table.name,
            table.columns.len(),
            table.measures.len()
        ));
    }

    let measure = core.create_measure("Sales", "Total Sales", "SUM(Sales[Amount])", None)?;
    transcript.push(format!("Created measure [{}] = {}", measure.name, measure.expression));

    let measure = core.update_measure(
        "Sales",
        "Total Sales",
        "SUMX(Sales, Sales[Amount] * Sales[Quantity])",
        Some("#,0.00"),
    )?;
    transcript.push(format!(
        "Updated measure [{}] format {}",
        measure.name,
        measure.format_string.as_deref().unwrap_or("-")
    ));

    let column = core.create_calculated_column(
        "Sales",
        "Margin",
        "Sales[Amount] - Sales[Cost]",
        Some(DataType::Decimal),
    )?;
    transcript.push(format!("Created column [{}] as {}", column.name, column.data_type));

    let relationship = core.create_relationship("Sales", "DateKey", "Date", "DateKey")?;
    transcript.push(format!(
        "Linked {}[{}] -> {}[{}]",
        relationship.from_table,
        relationship.from_column,
        relationship.to_table,
        relationship.to_column
    ));

    let deleted = core.delete_measure("Sales", "Average Price")?;
    transcript.push(format!("Deleted missing measure: {}", deleted));

    core.refresh_model(RefreshKind::Calculate)?;
    transcript.push(format!("Requested {} refresh", RefreshKind::Calculate));

    if let Some(second) = instances.iter().find(|i| **i != first) {
        core.connect_by_instance(second)?;
        transcript.push(format!(
            "Switched to {} ({} measures)",
            second,
            core.measures()?.count()
        ));
    }

    core.disconnect();
    transcript.push(format!("Session {}", core.state()));

    Ok(transcript)
}

/// Options matching the scenario's process names
fn demo_options(settings: &Settings) -> DiscoveryOptions {
    DiscoveryOptions {
        host_process: scenario::HOST_PROCESS.to_string(),
        server_process: scenario::SERVER_PROCESS.to_string(),
        ..settings.discovery.to_options()
    }
}

impl DemoScenario {
    /// Facade over the scenario's synthetic system
    pub fn core(&self, settings: &Settings) -> PbiCore {
        PbiCoreBuilder::new(Arc::new(self.server.clone()))
            .with_introspector(Arc::new(self.introspector.clone()))
            .with_options(demo_options(settings))
            .with_diagnostics(settings.diagnostics.enabled)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbilink_core::session::SessionState;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_play_full_scenario() {
        let scenario = DemoScenario::build();
        let mut core = scenario.core(&Settings::default());

        let transcript = play(&mut core).unwrap();

        assert_eq!(transcript[0], "Discovered 2 instance(s):");
        assert!(transcript
            .iter()
            .any(|l| l.starts_with("Connected to Sales.pbix")));
        assert!(transcript.contains(&"Deleted missing measure: false".to_string()));
        assert!(transcript
            .iter()
            .any(|l| l.starts_with("Switched to Inventory.pbit")));
        assert_eq!(transcript.last().map(String::as_str), Some("Session disconnected"));
        assert_eq!(core.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_play_commits_to_server() {
        let scenario = DemoScenario::build();
        let mut core = scenario.core(&Settings::default());
        play(&mut core).unwrap();

        let model = scenario.server.model(SALES_PORT, "Sales").unwrap();
        let sales = model.find_table("Sales").unwrap();
        let measure = sales.find_measure("Total Sales").unwrap();
        assert_eq!(measure.format_string.as_deref(), Some("#,0.00"));
        assert!(sales.find_column("Margin").unwrap().is_calculated());
        assert_eq!(model.relationships.len(), 1);
        assert_eq!(
            scenario.server.refreshes(),
            vec![("Sales".to_string(), RefreshKind::Calculate)]
        );
        assert!(scenario.server.live_connections().is_empty());
    }

    #[test]
    fn test_demo_ignores_process_name_overrides() {
        let mut settings = Settings::default();
        settings.discovery.host_process = "SomethingElse".to_string();

        let scenario = DemoScenario::build();
        let core = scenario.core(&settings);
        assert_eq!(core.list_instances().len(), 2);
    }
}
