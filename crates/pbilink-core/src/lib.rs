//! Core library for pbilink.
//!
//! Finds the analysis server embedded in running Power BI Desktop instances
//! by correlating the process tree with the local TCP socket table, and
//! manages a single model session against a discovered endpoint.

pub mod api;
pub mod diagnostics;
pub mod discovery;
pub mod model;
pub mod remote;
pub mod session;
pub mod system;
