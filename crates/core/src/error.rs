#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed operation: {0}")]
    Malformed(String),

    #[error("Invalid source document: {0}")]
    InvalidDocument(String),

    #[error("Missing table name or operation type")]
    MissingField,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("New columns detected in '{table}': {}", columns.join(", "))]
    UnknownColumns { table: String, columns: Vec<String> },

    #[error("Unknown condition column '{column}' in '{table}'")]
    UnknownConditionColumn { table: String, column: String },

    #[error("Type error in column '{column}': cannot store {value} as {expected}")]
    TypeMismatch {
        column: String,
        expected: String,
        value: String,
    },
}
