use thiserror::Error;

/// Reasons a printer payload cannot be turned into a status line.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing or invalid 'print' object")]
    NotAPrintReport,

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid field '{field}': expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
