use thiserror::Error;

use crate::data::model::FieldType;

/// Errors raised by the dataset model and the filter-aggregate pipeline.
///
/// Every variant is a caller mistake (asking for a field or an aggregation the
/// schema cannot support). Empty results are never errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("unknown field '{0}'")]
    Schema(String),

    #[error("field '{field}' is {found}, expected {expected}")]
    Type {
        field: String,
        expected: &'static str,
        found: FieldType,
    },

    #[error("duplicate field '{0}' in schema")]
    DuplicateField(String),

    #[error("row {row} has {found} values but the schema declares {expected}")]
    Arity {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}: value for '{field}' is {found}, expected {expected}")]
    Cell {
        row: usize,
        field: String,
        expected: FieldType,
        found: FieldType,
    },
}
