use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to read workbook: {source}")]
    Parse {
        #[from]
        source: calamine::XlsxError,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid multipart request: {source}")]
    Multipart {
        #[from]
        source: axum::extract::multipart::MultipartError,
    },

    #[error("Missing form field '{0}'")]
    MissingField(&'static str),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Archive error: {0}")]
    Zip(String),

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: serde_json::Error,
    },
}

impl From<tokio::task::JoinError> for ReportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ReportError::Task(err.to_string())
    }
}

pub type Result<T, E = ReportError> = std::result::Result<T, E>;
