//! Error types for the sensorhub service

/// Errors raised while decoding a sensor's nested time-series payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(String),

    #[error("payload is not a JSON array")]
    NotAnArray,

    #[error("reading {index} is not a JSON object")]
    NotAnObject { index: usize },
}

/// Errors that can occur in the sensorhub service
#[derive(Debug, thiserror::Error)]
pub enum SensorhubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Payload parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dashboard error: {0}")]
    Dashboard(String),
}

/// Result type alias for sensorhub operations
pub type Result<T> = std::result::Result<T, SensorhubError>;
