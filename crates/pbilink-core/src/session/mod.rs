//! Exclusive model session against one server endpoint.

mod error;
#[allow(clippy::module_inception)]
mod session;

pub use error::{EntityKind, SessionError};
pub use session::{Session, SessionState};
