//! PbiCore, the facade entry point for all consumers.
//!
//! Owns the introspector, the diagnostics log and the session. Discovery
//! faults only surface in the diagnostics log; connection and schema faults
//! come back as [`SessionError`].

use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::discovery::{DiscoveryOptions, InstanceCatalog, InstanceDescriptor};
use crate::model::{Column, DataType, Measure, RefreshKind, Relationship, Table};
use crate::remote::ModelServer;
use crate::session::{Session, SessionError, SessionState};
use crate::system::Introspector;

/// The Facade that wraps discovery and the model session.
///
/// Constructed via [`PbiCoreBuilder`](super::builder::PbiCoreBuilder).
pub struct PbiCore {
    introspector: Arc<dyn Introspector>,
    options: DiscoveryOptions,
    diagnostics: Diagnostics,
    session: Session,
}

impl PbiCore {
    /// Create a new PbiCore instance (prefer `PbiCoreBuilder`)
    pub(crate) fn new(
        introspector: Arc<dyn Introspector>,
        options: DiscoveryOptions,
        diagnostics: Diagnostics,
        server: Arc<dyn ModelServer>,
    ) -> Self {
        Self {
            introspector,
            options,
            diagnostics,
            session: Session::new(server),
        }
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    // =========================================================
    // Discovery
    // =========================================================

    /// Enumerate running instances with a resolved port
    pub fn list_instances(&self) -> Vec<InstanceDescriptor> {
        InstanceCatalog::new(self.introspector.as_ref(), &self.options, &self.diagnostics).list()
    }

    pub fn set_diagnostics(&self, enabled: bool) {
        self.diagnostics.set_enabled(enabled);
    }

    /// Rendered diagnostics of the last scan, plus anything logged since
    pub fn diagnostic_log(&self) -> Vec<String> {
        self.diagnostics.lines()
    }

    // =========================================================
    // Connection
    // =========================================================

    pub fn connect_by_instance(
        &mut self,
        descriptor: &InstanceDescriptor,
    ) -> Result<(), SessionError> {
        let result = self.session.connect(descriptor);
        if let Err(e) = &result {
            self.diagnostics
                .log(|| format!("connect to {} failed: {}", descriptor, e));
        }
        result
    }

    /// Connect to a known port, bypassing discovery
    pub fn connect_by_port(&mut self, port: u16) -> Result<(), SessionError> {
        self.connect_by_instance(&InstanceCatalog::create_manual(port))
    }

    /// Discover instances and connect to the first one
    ///
    /// Returns the descriptor that was connected to.
    pub fn connect_first_available(&mut self) -> Result<InstanceDescriptor, SessionError> {
        let first = self
            .list_instances()
            .into_iter()
            .next()
            .ok_or(SessionError::NoInstances)?;
        self.connect_by_instance(&first)?;
        Ok(first)
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    // =========================================================
    // Schema
    // =========================================================

    pub fn tables(&self) -> Result<impl Iterator<Item = &Table> + '_, SessionError> {
        self.session.tables()
    }

    pub fn measures(&self) -> Result<impl Iterator<Item = (&str, &Measure)> + '_, SessionError> {
        self.session.measures()
    }

    pub fn find_table(&self, name: &str) -> Result<Option<&Table>, SessionError> {
        self.session.find_table(name)
    }

    pub fn columns(&self, table: &str) -> Result<impl Iterator<Item = &Column> + '_, SessionError> {
        self.session.columns(table)
    }

    pub fn relationships(
        &self,
    ) -> Result<impl Iterator<Item = &Relationship> + '_, SessionError> {
        self.session.relationships()
    }

    pub fn create_measure(
        &mut self,
        table: &str,
        name: &str,
        expression: &str,
        format_string: Option<&str>,
    ) -> Result<Measure, SessionError> {
        self.session
            .create_measure(table, name, expression, format_string)
    }

    pub fn update_measure(
        &mut self,
        table: &str,
        name: &str,
        expression: &str,
        format_string: Option<&str>,
    ) -> Result<Measure, SessionError> {
        self.session
            .update_measure(table, name, expression, format_string)
    }

    pub fn delete_measure(&mut self, table: &str, name: &str) -> Result<bool, SessionError> {
        self.session.delete_measure(table, name)
    }

    pub fn create_calculated_column(
        &mut self,
        table: &str,
        name: &str,
        expression: &str,
        data_type: Option<DataType>,
    ) -> Result<Column, SessionError> {
        self.session
            .create_calculated_column(table, name, expression, data_type)
    }

    pub fn create_relationship(
        &mut self,
        from_table: &str,
        from_column: &str,
        to_table: &str,
        to_column: &str,
    ) -> Result<Relationship, SessionError> {
        self.session
            .create_relationship(from_table, from_column, to_table, to_column)
    }

    pub fn refresh_model(&mut self, kind: RefreshKind) -> Result<(), SessionError> {
        self.session.refresh_model(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PbiCoreBuilder;
    use crate::model::Model;
    use crate::remote::InMemoryServer;
    use crate::system::FixtureIntrospector;
    use pretty_assertions::assert_eq;

    fn core_with(fixture: FixtureIntrospector, server: InMemoryServer) -> PbiCore {
        PbiCoreBuilder::new(Arc::new(server))
            .with_introspector(Arc::new(fixture))
            .with_diagnostics(true)
            .build()
    }

    fn sales_model() -> Model {
        Model {
            tables: vec![Table::new("Sales")],
            relationships: Vec::new(),
        }
    }

    #[test]
    fn test_list_and_connect_first_available() {
        let fixture = FixtureIntrospector::new()
            .with_process(100, 1, "PBIDesktop.exe", "PBIDesktop.exe Sales.pbix")
            .with_process(200, 100, "msmdsrv.exe", "")
            .with_listener(Some(200), 55000);
        let server = InMemoryServer::new().with_database(55000, "db", sales_model());
        let mut core = core_with(fixture, server.clone());

        let instances = core.list_instances();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].port(), 55000);

        let connected = core.connect_first_available().unwrap();
        assert_eq!(connected, instances[0]);
        assert_eq!(core.state(), SessionState::Connected);
        assert_eq!(core.tables().unwrap().count(), 1);
        assert_eq!(server.live_connections().len(), 1);

        core.disconnect();
        assert!(server.live_connections().is_empty());
    }

    #[test]
    fn test_connect_first_available_without_instances() {
        let mut core = core_with(FixtureIntrospector::new(), InMemoryServer::new());

        let err = core.connect_first_available().unwrap_err();
        assert!(matches!(err, SessionError::NoInstances));
        assert!(core
            .diagnostic_log()
            .iter()
            .any(|line| line.ends_with("no instances found")));
    }

    #[test]
    fn test_connect_by_port_zero() {
        let mut core = core_with(FixtureIntrospector::new(), InMemoryServer::new());

        let err = core.connect_by_port(0).unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument { .. }));
        assert_eq!(core.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connect_failure_is_logged() {
        let mut core = core_with(FixtureIntrospector::new(), InMemoryServer::new());

        assert!(core.connect_by_port(55000).is_err());
        assert!(core
            .diagnostic_log()
            .iter()
            .any(|line| line.contains("connect to Unknown (pid unknown, port 55000) failed")));
    }

    #[test]
    fn test_schema_ops_through_facade() {
        let server = InMemoryServer::new().with_database(55000, "db", sales_model());
        let mut core = core_with(FixtureIntrospector::new(), server);
        core.connect_by_port(55000).unwrap();

        core.create_measure("Sales", "Rows", "COUNTROWS(Sales)", Some("0"))
            .unwrap();
        core.update_measure("Sales", "Rows", "COUNTROWS(Sales) + 0", None)
            .unwrap();
        let measures: Vec<_> = core
            .measures()
            .unwrap()
            .map(|(table, m)| (table.to_string(), m.clone()))
            .collect();
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0].1.format_string.as_deref(), Some("0"));

        assert!(core.delete_measure("Sales", "Rows").unwrap());
        assert!(!core.delete_measure("Sales", "Rows").unwrap());
        core.refresh_model(RefreshKind::Full).unwrap();
    }

    #[test]
    fn test_set_diagnostics_toggle() {
        let core = core_with(FixtureIntrospector::new(), InMemoryServer::new());
        core.set_diagnostics(false);
        core.list_instances();
        assert!(core.diagnostic_log().is_empty());

        core.set_diagnostics(true);
        core.list_instances();
        assert!(!core.diagnostic_log().is_empty());
    }
}
