//! Local view of a tabular model.
//!
//! The server owns the model. A session keeps a copy it can read without a
//! round-trip, stages [`ModelChange`]s against a clone, and swaps the clone in
//! only after the server accepts the commit.

mod change;
mod types;

pub use change::{ModelChange, ModelError};
pub use types::{
    Cardinality, Column, DataType, Measure, Model, RefreshKind, Relationship, Table,
};
