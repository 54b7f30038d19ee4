use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;

use crate::model::{Model, ModelChange, RefreshKind};

use super::{parse_connection_port, ModelConnection, ModelServer};

#[derive(Debug, Default)]
struct ServerState {
    /// port -> database name -> model
    endpoints: BTreeMap<u16, BTreeMap<String, Model>>,
    /// id -> connection string of open connections
    live: BTreeMap<u64, String>,
    next_id: u64,
    commits: usize,
    refreshes: Vec<(String, RefreshKind)>,
    pending_refresh: BTreeMap<u64, Vec<(String, RefreshKind)>>,
    fail_next_commit: bool,
}

/// Analysis server simulated in memory
///
/// Clones share state, so a test can keep a handle while a session owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl InMemoryServer {
    /// Server with no endpoints
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `model` as `database` on `port`
    pub fn with_database(self, port: u16, database: &str, model: Model) -> Self {
        self.state
            .lock()
            .endpoints
            .entry(port)
            .or_default()
            .insert(database.to_string(), model);
        self
    }

    /// Expose an endpoint with no databases
    pub fn with_empty_endpoint(self, port: u16) -> Self {
        self.state.lock().endpoints.entry(port).or_default();
        self
    }

    /// Connection strings of currently open connections
    pub fn live_connections(&self) -> Vec<String> {
        self.state.lock().live.values().cloned().collect()
    }

    /// Number of accepted commits
    pub fn commit_count(&self) -> usize {
        self.state.lock().commits
    }

    /// Refreshes carried out by commits, in order
    pub fn refreshes(&self) -> Vec<(String, RefreshKind)> {
        self.state.lock().refreshes.clone()
    }

    /// Reject the next commit
    pub fn fail_next_commit(&self) {
        self.state.lock().fail_next_commit = true;
    }

    /// Server-side copy of a database model
    pub fn model(&self, port: u16, database: &str) -> Option<Model> {
        self.state
            .lock()
            .endpoints
            .get(&port)
            .and_then(|dbs| dbs.get(database))
            .cloned()
    }
}

impl ModelServer for InMemoryServer {
    fn open(&self, connection_string: &str) -> Result<Box<dyn ModelConnection>> {
        let port = parse_connection_port(connection_string)
            .with_context(|| format!("Invalid connection string: {}", connection_string))?;

        let mut state = self.state.lock();
        if !state.endpoints.contains_key(&port) {
            bail!("No server listening at localhost:{}", port);
        }

        let id = state.next_id;
        state.next_id += 1;
        state.live.insert(id, connection_string.to_string());

        Ok(Box::new(InMemoryConnection {
            id,
            port,
            connection_string: connection_string.to_string(),
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct InMemoryConnection {
    id: u64,
    port: u16,
    connection_string: String,
    state: Arc<Mutex<ServerState>>,
    closed: bool,
}

impl InMemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            bail!("Connection is closed");
        }
        Ok(())
    }
}

impl ModelConnection for InMemoryConnection {
    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn databases(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let state = self.state.lock();
        Ok(state
            .endpoints
            .get(&self.port)
            .map(|dbs| dbs.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn load_model(&mut self, database: &str) -> Result<Model> {
        self.ensure_open()?;
        self.state
            .lock()
            .endpoints
            .get(&self.port)
            .and_then(|dbs| dbs.get(database))
            .cloned()
            .ok_or_else(|| anyhow!("Database not found: {}", database))
    }

    fn commit(&mut self, database: &str, changes: &[ModelChange]) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();

        if state.fail_next_commit {
            state.fail_next_commit = false;
            state.pending_refresh.remove(&self.id);
            bail!("Server rejected the transaction");
        }

        let current = state
            .endpoints
            .get(&self.port)
            .and_then(|dbs| dbs.get(database))
            .ok_or_else(|| anyhow!("Database not found: {}", database))?;

        // all or nothing
        let mut next = current.clone();
        for change in changes {
            next.apply(change)?;
        }

        if let Some(dbs) = state.endpoints.get_mut(&self.port) {
            dbs.insert(database.to_string(), next);
        }
        let pending = state.pending_refresh.remove(&self.id).unwrap_or_default();
        state.refreshes.extend(pending);
        state.commits += 1;
        Ok(())
    }

    fn request_refresh(&mut self, database: &str, kind: RefreshKind) -> Result<()> {
        self.ensure_open()?;
        self.state
            .lock()
            .pending_refresh
            .entry(self.id)
            .or_default()
            .push((database.to_string(), kind));
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.state.lock();
        state.live.remove(&self.id);
        state.pending_refresh.remove(&self.id);
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}
