use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::discovery::InstanceDescriptor;
use crate::model::{
    Column, DataType, Measure, Model, ModelChange, RefreshKind, Relationship, Table,
};
use crate::remote::{connection_string, ModelConnection, ModelServer};

use super::error::{EntityKind, SessionError};

/// Whether a session currently holds a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connected => write!(f, "connected"),
        }
    }
}

/// Everything that exists only while connected
struct ActiveConnection {
    descriptor: InstanceDescriptor,
    connection: Box<dyn ModelConnection>,
    database: String,
    model: Model,
}

impl ActiveConnection {
    /// Stage `change` on a copy of the model and commit it
    ///
    /// The local model is replaced only after the server accepts the commit.
    fn commit(&mut self, change: ModelChange) -> Result<(), SessionError> {
        let mut staged = self.model.clone();
        staged.apply(&change)?;

        self.connection
            .commit(&self.database, std::slice::from_ref(&change))
            .map_err(SessionError::Commit)?;

        self.model = staged;
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&Table, SessionError> {
        self.model
            .find_table(name)
            .ok_or_else(|| SessionError::not_found(EntityKind::Table, name))
    }
}

/// Holds at most one connection to an analysis server
///
/// Every schema operation requires the connected state and fails with
/// [`SessionError::NotConnected`] otherwise.
pub struct Session {
    server: Arc<dyn ModelServer>,
    active: Option<ActiveConnection>,
}

impl Session {
    /// Create a disconnected session
    pub fn new(server: Arc<dyn ModelServer>) -> Self {
        Self {
            server,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Descriptor of the connected instance
    pub fn descriptor(&self) -> Option<&InstanceDescriptor> {
        self.active.as_ref().map(|a| &a.descriptor)
    }

    /// Name of the bound database
    pub fn database(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.database.as_str())
    }

    /// Connect to the server behind `descriptor`
    ///
    /// Any existing connection is torn down first. On failure the session is
    /// left disconnected.
    pub fn connect(&mut self, descriptor: &InstanceDescriptor) -> Result<(), SessionError> {
        if !descriptor.is_resolved() {
            return Err(SessionError::invalid("port must be greater than zero"));
        }

        self.disconnect();

        let target = connection_string(descriptor.port());
        match self.open(&target, descriptor) {
            Ok(active) => {
                info!(
                    "Connected to {} (database {})",
                    active.descriptor, active.database
                );
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", target, e);
                self.active = None;
                Err(e)
            }
        }
    }

    fn open(
        &self,
        target: &str,
        descriptor: &InstanceDescriptor,
    ) -> Result<ActiveConnection, SessionError> {
        let mut connection = self
            .server
            .open(target)
            .map_err(|e| SessionError::connection(target, format!("{:#}", e)))?;

        // one logical database per embedded server: bind to the first
        let bound = connection.databases().and_then(|databases| {
            let database = databases
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("server exposes no database"))?;
            let model = connection.load_model(&database)?;
            Ok((database, model))
        });

        match bound {
            Ok((database, model)) => Ok(ActiveConnection {
                descriptor: descriptor.clone(),
                connection,
                database,
                model,
            }),
            Err(e) => {
                connection.close();
                Err(SessionError::connection(target, format!("{:#}", e)))
            }
        }
    }

    /// Close the connection, if any. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.connection.close();
            info!("Disconnected from {}", active.descriptor);
        }
    }

    fn ensure_connected(&self) -> Result<&ActiveConnection, SessionError> {
        self.active.as_ref().ok_or(SessionError::NotConnected)
    }

    fn ensure_connected_mut(&mut self) -> Result<&mut ActiveConnection, SessionError> {
        self.active.as_mut().ok_or(SessionError::NotConnected)
    }

    // =========================================================
    // Reads
    // =========================================================

    pub fn tables(&self) -> Result<impl Iterator<Item = &Table> + '_, SessionError> {
        Ok(self.ensure_connected()?.model.tables.iter())
    }

    /// Every measure with the name of its table
    pub fn measures(&self) -> Result<impl Iterator<Item = (&str, &Measure)> + '_, SessionError> {
        Ok(self
            .ensure_connected()?
            .model
            .tables
            .iter()
            .flat_map(|t| t.measures.iter().map(move |m| (t.name.as_str(), m))))
    }

    pub fn find_table(&self, name: &str) -> Result<Option<&Table>, SessionError> {
        Ok(self.ensure_connected()?.model.find_table(name))
    }

    pub fn columns(&self, table: &str) -> Result<impl Iterator<Item = &Column> + '_, SessionError> {
        Ok(self.ensure_connected()?.table(table)?.columns.iter())
    }

    pub fn relationships(
        &self,
    ) -> Result<impl Iterator<Item = &Relationship> + '_, SessionError> {
        Ok(self.ensure_connected()?.model.relationships.iter())
    }

    // =========================================================
    // Mutations
    // =========================================================

    /// Add a measure to `table` and commit
    pub fn create_measure(
        &mut self,
        table: &str,
        name: &str,
        expression: &str,
        format_string: Option<&str>,
    ) -> Result<Measure, SessionError> {
        let active = self.ensure_connected_mut()?;
        active.table(table)?;

        let measure = Measure {
            name: name.to_string(),
            expression: expression.to_string(),
            format_string: format_string.map(str::to_string),
        };
        active.commit(ModelChange::AddMeasure {
            table: table.to_string(),
            measure: measure.clone(),
        })?;

        info!("Created measure {}[{}]", table, name);
        Ok(measure)
    }

    /// Replace a measure's expression, and its format string when given
    ///
    /// `None` leaves the existing format string untouched.
    pub fn update_measure(
        &mut self,
        table: &str,
        name: &str,
        expression: &str,
        format_string: Option<&str>,
    ) -> Result<Measure, SessionError> {
        let active = self.ensure_connected_mut()?;
        let mut measure = active
            .table(table)?
            .find_measure(name)
            .cloned()
            .ok_or_else(|| {
                SessionError::not_found(EntityKind::Measure, format!("{}[{}]", table, name))
            })?;

        measure.expression = expression.to_string();
        if let Some(format_string) = format_string {
            measure.format_string = Some(format_string.to_string());
        }

        active.commit(ModelChange::UpdateMeasure {
            table: table.to_string(),
            measure: measure.clone(),
        })?;

        info!("Updated measure {}[{}]", table, name);
        Ok(measure)
    }

    /// Remove a measure and commit
    ///
    /// A missing table or measure yields `Ok(false)` rather than an error,
    /// unlike create/update.
    pub fn delete_measure(&mut self, table: &str, name: &str) -> Result<bool, SessionError> {
        let active = self.ensure_connected_mut()?;
        let exists = active
            .model
            .find_table(table)
            .is_some_and(|t| t.find_measure(name).is_some());
        if !exists {
            return Ok(false);
        }

        active.commit(ModelChange::RemoveMeasure {
            table: table.to_string(),
            name: name.to_string(),
        })?;

        info!("Deleted measure {}[{}]", table, name);
        Ok(true)
    }

    /// Add a calculated column (String when no type is given) and commit
    pub fn create_calculated_column(
        &mut self,
        table: &str,
        name: &str,
        expression: &str,
        data_type: Option<DataType>,
    ) -> Result<Column, SessionError> {
        let active = self.ensure_connected_mut()?;
        active.table(table)?;

        let column = Column {
            name: name.to_string(),
            data_type: data_type.unwrap_or_default(),
            expression: Some(expression.to_string()),
        };
        active.commit(ModelChange::AddColumn {
            table: table.to_string(),
            column: column.clone(),
        })?;

        info!("Created calculated column {}[{}]", table, name);
        Ok(column)
    }

    /// Add a many-to-one relationship, `from_column` on the many side
    pub fn create_relationship(
        &mut self,
        from_table: &str,
        from_column: &str,
        to_table: &str,
        to_column: &str,
    ) -> Result<Relationship, SessionError> {
        let active = self.ensure_connected_mut()?;
        for (table, column) in [(from_table, from_column), (to_table, to_column)] {
            if active.table(table)?.find_column(column).is_none() {
                return Err(SessionError::not_found(
                    EntityKind::Column,
                    format!("{}[{}]", table, column),
                ));
            }
        }

        let relationship = Relationship::many_to_one(from_table, from_column, to_table, to_column);
        active.commit(ModelChange::AddRelationship {
            relationship: relationship.clone(),
        })?;

        info!(
            "Created relationship {}[{}] -> {}[{}]",
            from_table, from_column, to_table, to_column
        );
        Ok(relationship)
    }

    /// Request a refresh of the bound database and commit it
    pub fn refresh_model(&mut self, kind: RefreshKind) -> Result<(), SessionError> {
        let active = self.ensure_connected_mut()?;
        active
            .connection
            .request_refresh(&active.database, kind)
            .map_err(SessionError::Commit)?;
        active
            .connection
            .commit(&active.database, &[])
            .map_err(SessionError::Commit)?;

        // pick up whatever the refresh changed server-side
        match active.connection.load_model(&active.database) {
            Ok(model) => active.model = model,
            Err(e) => warn!("Reload after refresh failed: {:#}", e),
        }

        info!("Refreshed {} ({})", active.database, kind);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cardinality;
    use crate::remote::InMemoryServer;
    use pretty_assertions::assert_eq;

    fn sample_model() -> Model {
        Model {
            tables: vec![
                Table::new("Sales")
                    .with_column(Column::data("Amount", DataType::Decimal))
                    .with_column(Column::data("DateKey", DataType::Int64))
                    .with_measure(Measure {
                        name: "Total".to_string(),
                        expression: "SUM(Sales[Amount])".to_string(),
                        format_string: Some("#,0.00".to_string()),
                    }),
                Table::new("Date").with_column(Column::data("DateKey", DataType::Int64)),
            ],
            relationships: Vec::new(),
        }
    }

    fn server() -> InMemoryServer {
        InMemoryServer::new()
            .with_database(55000, "model-a", sample_model())
            .with_database(56000, "model-b", sample_model())
    }

    fn connected(server: &InMemoryServer) -> Session {
        let mut session = Session::new(Arc::new(server.clone()));
        session
            .connect(&InstanceDescriptor::manual(55000))
            .unwrap();
        session
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let server = server();
        let mut session = Session::new(Arc::new(server.clone()));
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect(&InstanceDescriptor::manual(55000)).unwrap();
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.descriptor().is_none());
        assert!(server.live_connections().is_empty());
    }

    #[test]
    fn test_connect_rejects_port_zero() {
        let server = server();
        let mut session = Session::new(Arc::new(server.clone()));

        let err = session.connect(&InstanceDescriptor::manual(0)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument { .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(server.live_connections().is_empty());
    }

    #[test]
    fn test_port_zero_keeps_existing_connection() {
        let server = server();
        let mut session = connected(&server);

        assert!(session.connect(&InstanceDescriptor::manual(0)).is_err());
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_reconnect_keeps_single_connection() {
        let server = server();
        let mut session = connected(&server);

        session
            .connect(&InstanceDescriptor::new(Some(7), 56000, "b.pbix"))
            .unwrap();

        assert_eq!(
            server.live_connections(),
            vec!["Data Source=localhost:56000".to_string()]
        );
        assert_eq!(session.database(), Some("model-b"));
        assert_eq!(session.descriptor().unwrap().port(), 56000);
    }

    #[test]
    fn test_failed_connect_leaves_disconnected() {
        let server = server();
        let mut session = connected(&server);

        let err = session
            .connect(&InstanceDescriptor::manual(57000))
            .unwrap_err();
        assert!(matches!(err, SessionError::Connection { .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.descriptor().is_none());
        assert!(server.live_connections().is_empty());
    }

    #[test]
    fn test_connect_without_database_fails() {
        let server = InMemoryServer::new().with_empty_endpoint(55000);
        let mut session = Session::new(Arc::new(server.clone()));

        let err = session
            .connect(&InstanceDescriptor::manual(55000))
            .unwrap_err();
        assert!(err.to_string().contains("no database"));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(server.live_connections().is_empty());
    }

    #[test]
    fn test_operations_require_connection() {
        let mut session = Session::new(Arc::new(server()));

        assert!(matches!(session.tables(), Err(SessionError::NotConnected)));
        assert!(matches!(session.measures(), Err(SessionError::NotConnected)));
        assert!(matches!(session.find_table("Sales"), Err(SessionError::NotConnected)));
        assert!(matches!(
            session.create_measure("Sales", "X", "1", None),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.delete_measure("Sales", "Total"),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.refresh_model(RefreshKind::Full),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn test_create_measure_round_trip() {
        let server = server();
        let mut session = connected(&server);

        let created = session
            .create_measure("Sales", "Avg", "AVERAGE(Sales[Amount])", None)
            .unwrap();
        assert_eq!(created.name, "Avg");

        let table = session.find_table("Sales").unwrap().unwrap();
        let measure = table.find_measure("Avg").unwrap();
        assert_eq!(measure.expression, "AVERAGE(Sales[Amount])");
        assert_eq!(server.commit_count(), 1);

        let remote = server.model(55000, "model-a").unwrap();
        assert!(remote.find_table("Sales").unwrap().find_measure("Avg").is_some());
    }

    #[test]
    fn test_create_measure_missing_table() {
        let server = server();
        let mut session = connected(&server);

        let err = session
            .create_measure("Nope", "X", "1", None)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotFound { kind: EntityKind::Table, .. }
        ));
        assert_eq!(server.commit_count(), 0);
    }

    #[test]
    fn test_delete_measure_missing_returns_false() {
        let server = server();
        let mut session = connected(&server);

        assert!(!session.delete_measure("Nope", "Total").unwrap());
        assert!(!session.delete_measure("Sales", "Nope").unwrap());
        assert_eq!(server.commit_count(), 0);

        assert!(session.delete_measure("Sales", "Total").unwrap());
        assert!(session.measures().unwrap().next().is_none());
    }

    #[test]
    fn test_update_measure_format_handling() {
        let server = server();
        let mut session = connected(&server);

        let updated = session
            .update_measure("Sales", "Total", "SUMX(Sales, Sales[Amount])", None)
            .unwrap();
        assert_eq!(updated.expression, "SUMX(Sales, Sales[Amount])");
        assert_eq!(updated.format_string.as_deref(), Some("#,0.00"));

        let updated = session
            .update_measure("Sales", "Total", "SUM(Sales[Amount])", Some("0%"))
            .unwrap();
        assert_eq!(updated.format_string.as_deref(), Some("0%"));

        let stored = session
            .find_table("Sales")
            .unwrap()
            .unwrap()
            .find_measure("Total")
            .unwrap()
            .clone();
        assert_eq!(stored, updated);
    }

    #[test]
    fn test_update_missing_measure() {
        let server = server();
        let mut session = connected(&server);

        let err = session
            .update_measure("Sales", "Nope", "1", None)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotFound { kind: EntityKind::Measure, .. }
        ));
    }

    #[test]
    fn test_commit_failure_rolls_back_locally() {
        let server = server();
        let mut session = connected(&server);
        server.fail_next_commit();

        let err = session
            .create_measure("Sales", "Avg", "AVERAGE(Sales[Amount])", None)
            .unwrap_err();
        assert!(matches!(err, SessionError::Commit(_)));

        let table = session.find_table("Sales").unwrap().unwrap();
        assert!(table.find_measure("Avg").is_none());
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_create_calculated_column_defaults_to_string() {
        let server = server();
        let mut session = connected(&server);

        let column = session
            .create_calculated_column("Sales", "Label", "\"x\"", None)
            .unwrap();
        assert_eq!(column.data_type, DataType::String);
        assert!(column.is_calculated());

        let column = session
            .create_calculated_column("Sales", "Double", "Sales[Amount] * 2", Some(DataType::Decimal))
            .unwrap();
        assert_eq!(column.data_type, DataType::Decimal);

        let names: Vec<_> = session
            .columns("Sales")
            .unwrap()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Amount", "DateKey", "Label", "Double"]);
    }

    #[test]
    fn test_create_relationship() {
        let server = server();
        let mut session = connected(&server);

        let rel = session
            .create_relationship("Sales", "DateKey", "Date", "DateKey")
            .unwrap();
        assert_eq!(rel.from_cardinality, Cardinality::Many);
        assert_eq!(rel.to_cardinality, Cardinality::One);
        assert_eq!(session.relationships().unwrap().count(), 1);

        let err = session
            .create_relationship("Sales", "DateKey", "Date", "Missing")
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotFound { kind: EntityKind::Column, .. }
        ));
        let err = session
            .create_relationship("Nope", "DateKey", "Date", "DateKey")
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotFound { kind: EntityKind::Table, .. }
        ));
    }

    #[test]
    fn test_refresh_model_commits_once() {
        let server = server();
        let mut session = connected(&server);

        session.refresh_model(RefreshKind::Calculate).unwrap();
        assert_eq!(server.commit_count(), 1);
        assert_eq!(
            server.refreshes(),
            vec![("model-a".to_string(), RefreshKind::Calculate)]
        );
    }

    #[test]
    fn test_reads_are_restartable() {
        let server = server();
        let session = connected(&server);

        let first: Vec<_> = session.tables().unwrap().map(|t| t.name.clone()).collect();
        let second: Vec<_> = session.tables().unwrap().map(|t| t.name.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["Sales", "Date"]);

        let measures: Vec<_> = session
            .measures()
            .unwrap()
            .map(|(table, m)| (table.to_string(), m.name.clone()))
            .collect();
        assert_eq!(measures, vec![("Sales".to_string(), "Total".to_string())]);
    }

    #[test]
    fn test_drop_closes_connection() {
        let server = server();
        {
            let _session = connected(&server);
            assert_eq!(server.live_connections().len(), 1);
        }
        assert!(server.live_connections().is_empty());
    }
}
