use serde::Serialize;
use thiserror::Error;

use super::types::{Column, Measure, Model, Relationship};

/// A single staged modification to a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change")]
pub enum ModelChange {
    AddMeasure { table: String, measure: Measure },
    UpdateMeasure { table: String, measure: Measure },
    RemoveMeasure { table: String, name: String },
    AddColumn { table: String, column: Column },
    AddRelationship { relationship: Relationship },
}

/// Why a change could not be applied to a model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("measure not found: {table}[{name}]")]
    MeasureNotFound { table: String, name: String },

    #[error("column not found: {table}[{name}]")]
    ColumnNotFound { table: String, name: String },

    #[error("{kind} already exists: {name}")]
    Duplicate { kind: &'static str, name: String },
}

impl Model {
    /// Apply one change in place
    ///
    /// On error the model is left untouched.
    pub fn apply(&mut self, change: &ModelChange) -> Result<(), ModelError> {
        match change {
            ModelChange::AddMeasure { table, measure } => {
                let t = self.table_mut(table)?;
                if t.find_measure(&measure.name).is_some() {
                    return Err(ModelError::Duplicate {
                        kind: "measure",
                        name: measure.name.clone(),
                    });
                }
                t.measures.push(measure.clone());
            }
            ModelChange::UpdateMeasure { table, measure } => {
                let t = self.table_mut(table)?;
                let existing = t
                    .measures
                    .iter_mut()
                    .find(|m| m.name == measure.name)
                    .ok_or_else(|| ModelError::MeasureNotFound {
                        table: table.clone(),
                        name: measure.name.clone(),
                    })?;
                *existing = measure.clone();
            }
            ModelChange::RemoveMeasure { table, name } => {
                let t = self.table_mut(table)?;
                let idx = t.measures.iter().position(|m| &m.name == name).ok_or_else(|| {
                    ModelError::MeasureNotFound {
                        table: table.clone(),
                        name: name.clone(),
                    }
                })?;
                t.measures.remove(idx);
            }
            ModelChange::AddColumn { table, column } => {
                let t = self.table_mut(table)?;
                if t.find_column(&column.name).is_some() {
                    return Err(ModelError::Duplicate {
                        kind: "column",
                        name: column.name.clone(),
                    });
                }
                t.columns.push(column.clone());
            }
            ModelChange::AddRelationship { relationship } => {
                self.column_exists(&relationship.from_table, &relationship.from_column)?;
                self.column_exists(&relationship.to_table, &relationship.to_column)?;
                self.relationships.push(relationship.clone());
            }
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut super::Table, ModelError> {
        self.find_table_mut(name)
            .ok_or_else(|| ModelError::TableNotFound(name.to_string()))
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<(), ModelError> {
        let t = self
            .find_table(table)
            .ok_or_else(|| ModelError::TableNotFound(table.to_string()))?;
        t.find_column(column)
            .map(|_| ())
            .ok_or_else(|| ModelError::ColumnNotFound {
                table: table.to_string(),
                name: column.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, Table};
    use pretty_assertions::assert_eq;

    fn sample() -> Model {
        Model {
            tables: vec![
                Table::new("Sales").with_column(Column::data("DateKey", DataType::Int64)),
                Table::new("Date").with_column(Column::data("DateKey", DataType::Int64)),
            ],
            relationships: Vec::new(),
        }
    }

    fn measure(name: &str, expression: &str) -> Measure {
        Measure {
            name: name.to_string(),
            expression: expression.to_string(),
            format_string: None,
        }
    }

    #[test]
    fn test_add_update_remove_measure() {
        let mut model = sample();
        model
            .apply(&ModelChange::AddMeasure {
                table: "Sales".to_string(),
                measure: measure("Total", "SUM(Sales[Amount])"),
            })
            .unwrap();
        model
            .apply(&ModelChange::UpdateMeasure {
                table: "Sales".to_string(),
                measure: measure("Total", "SUMX(Sales, Sales[Amount])"),
            })
            .unwrap();
        assert_eq!(
            model.find_table("Sales").unwrap().find_measure("Total").unwrap().expression,
            "SUMX(Sales, Sales[Amount])"
        );

        model
            .apply(&ModelChange::RemoveMeasure {
                table: "Sales".to_string(),
                name: "Total".to_string(),
            })
            .unwrap();
        assert!(model.find_table("Sales").unwrap().measures.is_empty());
    }

    #[test]
    fn test_duplicate_measure_rejected() {
        let mut model = sample();
        let change = ModelChange::AddMeasure {
            table: "Sales".to_string(),
            measure: measure("Total", "1"),
        };
        model.apply(&change).unwrap();
        assert_eq!(
            model.apply(&change),
            Err(ModelError::Duplicate {
                kind: "measure",
                name: "Total".to_string()
            })
        );
    }

    #[test]
    fn test_relationship_requires_columns() {
        let mut model = sample();
        let missing = ModelChange::AddRelationship {
            relationship: Relationship::many_to_one("Sales", "Nope", "Date", "DateKey"),
        };
        assert_eq!(
            model.apply(&missing),
            Err(ModelError::ColumnNotFound {
                table: "Sales".to_string(),
                name: "Nope".to_string()
            })
        );
        assert!(model.relationships.is_empty());

        let ok = ModelChange::AddRelationship {
            relationship: Relationship::many_to_one("Sales", "DateKey", "Date", "DateKey"),
        };
        model.apply(&ok).unwrap();
        assert_eq!(model.relationships.len(), 1);
    }

    #[test]
    fn test_unknown_table() {
        let mut model = sample();
        let err = model
            .apply(&ModelChange::AddColumn {
                table: "Nope".to_string(),
                column: Column::data("X", DataType::String),
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "table not found: Nope");
    }
}
