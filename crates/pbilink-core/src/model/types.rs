use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declared column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    String,
    Int64,
    Double,
    Decimal,
    DateTime,
    Boolean,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => write!(f, "String"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::Double => write!(f, "Double"),
            DataType::Decimal => write!(f, "Decimal"),
            DataType::DateTime => write!(f, "DateTime"),
            DataType::Boolean => write!(f, "Boolean"),
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "text" => Ok(DataType::String),
            "int64" | "integer" | "whole" => Ok(DataType::Int64),
            "double" | "float" => Ok(DataType::Double),
            "decimal" | "currency" => Ok(DataType::Decimal),
            "datetime" | "date" => Ok(DataType::DateTime),
            "boolean" | "bool" => Ok(DataType::Boolean),
            other => Err(format!("unknown data type: {}", other)),
        }
    }
}

/// Scope of a data refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefreshKind {
    #[default]
    Full,
    Calculate,
    DataOnly,
    Automatic,
    ClearValues,
    Defragment,
}

impl fmt::Display for RefreshKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshKind::Full => write!(f, "full"),
            RefreshKind::Calculate => write!(f, "calculate"),
            RefreshKind::DataOnly => write!(f, "data-only"),
            RefreshKind::Automatic => write!(f, "automatic"),
            RefreshKind::ClearValues => write!(f, "clear-values"),
            RefreshKind::Defragment => write!(f, "defragment"),
        }
    }
}

impl FromStr for RefreshKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "full" => Ok(RefreshKind::Full),
            "calculate" => Ok(RefreshKind::Calculate),
            "data-only" | "dataonly" => Ok(RefreshKind::DataOnly),
            "automatic" => Ok(RefreshKind::Automatic),
            "clear-values" | "clearvalues" => Ok(RefreshKind::ClearValues),
            "defragment" => Ok(RefreshKind::Defragment),
            other => Err(format!("unknown refresh kind: {}", other)),
        }
    }
}

/// Relationship end multiplicity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// A measure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    /// Opaque expression text
    pub expression: String,
    pub format_string: Option<String>,
}

/// A column; calculated columns carry an expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub expression: Option<String>,
}

impl Column {
    /// A plain data column
    pub fn data(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            expression: None,
        }
    }

    /// Whether the column is computed from an expression
    pub fn is_calculated(&self) -> bool {
        self.expression.is_some()
    }
}

/// A table with its ordered columns and measures
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub measures: Vec<Measure>,
}

impl Table {
    /// Empty table
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Builder-style column append
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Builder-style measure append
    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn find_measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }
}

/// A relationship between two table columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub from_cardinality: Cardinality,
    pub to_cardinality: Cardinality,
    pub is_active: bool,
}

impl Relationship {
    /// Many-to-one relationship with `from` on the many side
    pub fn many_to_one(from_table: &str, from_column: &str, to_table: &str, to_column: &str) -> Self {
        Self {
            name: uuid::Uuid::new_v4().to_string(),
            from_table: from_table.to_string(),
            from_column: from_column.to_string(),
            to_table: to_table.to_string(),
            to_column: to_column.to_string(),
            from_cardinality: Cardinality::Many,
            to_cardinality: Cardinality::One,
            is_active: true,
        }
    }
}

/// Schema root of one database
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Model {
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
}

impl Model {
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub(crate) fn find_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parse() {
        assert_eq!("text".parse::<DataType>(), Ok(DataType::String));
        assert_eq!("Int64".parse::<DataType>(), Ok(DataType::Int64));
        assert_eq!("DATE".parse::<DataType>(), Ok(DataType::DateTime));
        assert!("blob".parse::<DataType>().is_err());
        assert_eq!(DataType::default(), DataType::String);
    }

    #[test]
    fn test_refresh_kind_parse() {
        assert_eq!("data_only".parse::<RefreshKind>(), Ok(RefreshKind::DataOnly));
        assert_eq!("Full".parse::<RefreshKind>(), Ok(RefreshKind::Full));
        assert_eq!(RefreshKind::ClearValues.to_string(), "clear-values");
        assert_eq!(RefreshKind::default(), RefreshKind::Full);
    }

    #[test]
    fn test_many_to_one_relationship() {
        let rel = Relationship::many_to_one("Sales", "DateKey", "Date", "DateKey");
        assert_eq!(rel.from_cardinality, Cardinality::Many);
        assert_eq!(rel.to_cardinality, Cardinality::One);
        assert!(rel.is_active);
        assert_eq!(rel.name.len(), 36);
    }
}
