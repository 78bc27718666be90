//! Error handling for the vitals pipeline.

/// A specialized `Result` type for vitals pipeline operations.
pub type Result<T> = std::result::Result<T, SystemError>;

/// The main error type for sampling, storage and configuration.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// A single metric could not be read on this host
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The backing store could not accept or serve the operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Malformed configuration, fatal at startup
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The system clock could not produce a timestamp
    #[error("Clock error: {0}")]
    Clock(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file or API payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),
}

impl SystemError {
    /// Create a new sensor error
    pub fn sensor_unavailable(msg: impl Into<String>) -> Self {
        Self::SensorUnavailable(msg.into())
    }

    /// Create a new store error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a new configuration error
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    /// Create a new clock error
    pub fn clock_error(msg: impl Into<String>) -> Self {
        Self::Clock(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Whether the failure is expected to clear up by the next scheduled tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SensorUnavailable(_) | Self::StoreUnavailable(_) | Self::Io(_)
        )
    }
}

impl From<rusqlite::Error> for SystemError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SystemError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::StoreUnavailable(format!("storage task failed: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for SystemError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::StoreUnavailable("storage call exceeded its deadline".to_string())
    }
}
