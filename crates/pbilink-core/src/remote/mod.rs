//! Boundary to the analysis server.
//!
//! The wire protocol is someone else's problem: implementations of
//! [`ModelServer`] receive a connection string and hand back a
//! [`ModelConnection`]. [`InMemoryServer`] is the built-in implementation used
//! by tests and the demo mode.

mod memory;

use anyhow::Result;

use crate::model::{Model, ModelChange, RefreshKind};

pub use memory::InMemoryServer;

/// Connection string prefix understood by the server
pub const DATA_SOURCE_PREFIX: &str = "Data Source=localhost:";

/// Build the connection string for a local server port
pub fn connection_string(port: u16) -> String {
    format!("{}{}", DATA_SOURCE_PREFIX, port)
}

/// Parse the port back out of a connection string built by [`connection_string`]
pub fn parse_connection_port(connection_string: &str) -> Option<u16> {
    connection_string
        .trim()
        .strip_prefix(DATA_SOURCE_PREFIX)?
        .trim_end_matches(';')
        .parse()
        .ok()
        .filter(|port| *port > 0)
}

/// Opens connections to an analysis server
pub trait ModelServer: Send + Sync {
    /// Open a connection for the given connection string
    fn open(&self, connection_string: &str) -> Result<Box<dyn ModelConnection>>;
}

/// A live connection to one server endpoint
pub trait ModelConnection: Send {
    /// The connection string this connection was opened with
    fn connection_string(&self) -> &str;

    /// Names of the databases exposed by the server, in server order
    fn databases(&self) -> Result<Vec<String>>;

    /// Fetch the current model of `database`
    fn load_model(&mut self, database: &str) -> Result<Model>;

    /// Persist a set of staged changes as one transaction
    fn commit(&mut self, database: &str, changes: &[ModelChange]) -> Result<()>;

    /// Queue a data refresh; it takes effect on the next commit
    fn request_refresh(&mut self, database: &str, kind: RefreshKind) -> Result<()>;

    /// Close the connection. Must be safe to call more than once.
    fn close(&mut self);
}
