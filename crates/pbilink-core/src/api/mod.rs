//! Public Facade API for pbilink-core.
//!
//! [`PbiCore`] bundles discovery, diagnostics and the model session behind the
//! operation surface consumers use:
//!
//! ```ignore
//! let mut core = PbiCoreBuilder::new(server).with_diagnostics(true).build();
//! let instances = core.list_instances();
//! core.connect_by_instance(&instances[0])?;
//! core.create_measure("Sales", "Total", "SUM(Sales[Amount])", None)?;
//! ```

mod builder;
mod core;

pub use builder::PbiCoreBuilder;
pub use self::core::PbiCore;
