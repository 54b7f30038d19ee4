use std::fmt;

use thiserror::Error;

use crate::model::ModelError;

/// Kind of named schema object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Table,
    Measure,
    Column,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Table => write!(f, "table"),
            EntityKind::Measure => write!(f, "measure"),
            EntityKind::Column => write!(f, "column"),
        }
    }
}

/// Error type for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// An argument failed validation (e.g. port 0, duplicate name)
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A named schema object does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: EntityKind, name: String },

    /// The operation needs a connected session
    #[error("not connected to a model server")]
    NotConnected,

    /// Discovery produced nothing to connect to
    #[error("no running instances found")]
    NoInstances,

    /// The server could not be reached or exposed no database
    #[error("connection to {target} failed: {message}")]
    Connection { target: String, message: String },

    /// The server rejected a commit or refresh request
    #[error("commit failed: {0:#}")]
    Commit(anyhow::Error),
}

impl SessionError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SessionError::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        SessionError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn connection(target: &str, message: impl fmt::Display) -> Self {
        SessionError::Connection {
            target: target.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<ModelError> for SessionError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::TableNotFound(name) => SessionError::not_found(EntityKind::Table, name),
            ModelError::MeasureNotFound { table, name } => {
                SessionError::not_found(EntityKind::Measure, format!("{}[{}]", table, name))
            }
            ModelError::ColumnNotFound { table, name } => {
                SessionError::not_found(EntityKind::Column, format!("{}[{}]", table, name))
            }
            dup @ ModelError::Duplicate { .. } => SessionError::invalid(dup.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::not_found(EntityKind::Table, "Sales");
        assert_eq!(err.to_string(), "table not found: Sales");

        let err = SessionError::NotConnected;
        assert_eq!(err.to_string(), "not connected to a model server");

        let err = SessionError::invalid("port must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid argument: port must be greater than zero"
        );

        let err = SessionError::connection("Data Source=localhost:1", "refused");
        assert_eq!(
            err.to_string(),
            "connection to Data Source=localhost:1 failed: refused"
        );
    }

    #[test]
    fn test_from_model_error() {
        let err: SessionError = ModelError::MeasureNotFound {
            table: "Sales".to_string(),
            name: "Total".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            SessionError::NotFound { kind: EntityKind::Measure, ref name } if name == "Sales[Total]"
        ));

        let err: SessionError = ModelError::Duplicate {
            kind: "measure",
            name: "Total".to_string(),
        }
        .into();
        assert!(matches!(err, SessionError::InvalidArgument { .. }));
    }
}
