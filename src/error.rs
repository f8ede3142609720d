use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Schema mismatch: table '{table}' has no column '{column}'")]
    SchemaMismatch { table: String, column: String },

    #[error("Malformed key at row {row}: '{value}' does not start with a date")]
    MalformedKey { row: usize, value: String },

    #[error("Invalid date at row {row} in column '{column}'")]
    InvalidDate { row: usize, column: String },

    #[error("Type mismatch at row {row} in column '{column}': expected {expected}")]
    TypeMismatch {
        column: String,
        row: usize,
        expected: String,
    },

    #[error("Unknown period '{0}'")]
    UnknownPeriod(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl PipelineError {
    pub fn schema_mismatch(table: impl Into<String>, column: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Row-level data-quality errors are recovered locally; everything else aborts the call.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedKey { .. } | PipelineError::InvalidDate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
