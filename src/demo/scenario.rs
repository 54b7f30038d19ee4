use pbilink_core::model::{Column, DataType, Measure, Model, Table};
use pbilink_core::remote::InMemoryServer;
use pbilink_core::system::FixtureIntrospector;

pub(super) const HOST_PROCESS: &str = "PBIDesktop";
pub(super) const SERVER_PROCESS: &str = "msmdsrv";

/// Port of the server owned by the first host (child arrangement)
pub const SALES_PORT: u16 = 51542;
/// Port of the server that launched the second host (inverted arrangement)
pub const INVENTORY_PORT: u16 = 53310;

/// Synthetic process table plus the model server behind it
pub struct DemoScenario {
    pub introspector: FixtureIntrospector,
    pub server: InMemoryServer,
}

impl DemoScenario {
    pub fn build() -> Self {
        let introspector = FixtureIntrospector::new()
            .with_process(1, 0, "init", "/sbin/init")
            .with_process(
                4120,
                1,
                "PBIDesktop.exe",
                r#""C:\Program Files\Microsoft Power BI Desktop\bin\PBIDesktop.exe" "C:\Users\analyst\Reports\Sales.pbix""#,
            )
            .with_process(4188, 4120, "msmdsrv.exe", "msmdsrv.exe -s workspace_4120")
            .with_process(5301, 1, "msmdsrv.exe", "msmdsrv.exe -s workspace_5230")
            .with_process(
                5230,
                5301,
                "PBIDesktop.exe",
                r#"PBIDesktop.exe C:\Users\analyst\Reports\Inventory.pbit"#,
            )
            .with_process(6001, 1, "sqlservr", "sqlservr")
            .with_listener(Some(4188), SALES_PORT)
            .with_listener(Some(5301), INVENTORY_PORT)
            .with_listener(Some(6001), 1433)
            .with_established(Some(4120), 50211);

        let server = InMemoryServer::new()
            .with_database(SALES_PORT, "Sales", sales_model())
            .with_database(INVENTORY_PORT, "Inventory", inventory_model());

        Self {
            introspector,
            server,
        }
    }
}

fn sales_model() -> Model {
    Model {
        tables: vec![
            Table::new("Sales")
                .with_column(Column::data("DateKey", DataType::Int64))
                .with_column(Column::data("Amount", DataType::Decimal))
                .with_column(Column::data("Cost", DataType::Decimal))
                .with_column(Column::data("Quantity", DataType::Int64)),
            Table::new("Date")
                .with_column(Column::data("DateKey", DataType::Int64))
                .with_column(Column::data("Date", DataType::DateTime))
                .with_column(Column::data("Year", DataType::Int64)),
        ],
        relationships: Vec::new(),
    }
}

fn inventory_model() -> Model {
    Model {
        tables: vec![Table::new("Stock")
            .with_column(Column::data("Sku", DataType::String))
            .with_column(Column::data("OnHand", DataType::Int64))
            .with_measure(Measure {
                name: "Units".to_string(),
                expression: "SUM(Stock[OnHand])".to_string(),
                format_string: None,
            })],
        relationships: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbilink_core::diagnostics::Diagnostics;
    use pbilink_core::discovery::{DiscoveryOptions, InstanceCatalog, InstanceDescriptor};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scenario_discovery() {
        let scenario = DemoScenario::build();
        let options = DiscoveryOptions::default();
        let diagnostics = Diagnostics::new(false);

        let instances = InstanceCatalog::new(&scenario.introspector, &options, &diagnostics).list();
        assert_eq!(
            instances,
            vec![
                InstanceDescriptor::new(
                    Some(4120),
                    SALES_PORT,
                    r"C:\Users\analyst\Reports\Sales.pbix"
                ),
                InstanceDescriptor::new(
                    Some(5230),
                    INVENTORY_PORT,
                    r"C:\Users\analyst\Reports\Inventory.pbit"
                ),
            ]
        );
    }
}
