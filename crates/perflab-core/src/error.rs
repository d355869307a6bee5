use thiserror::Error;

/// Canonical error type for load-test setup and reporting.
///
/// Search and evaluation never fail: RPC failures are counted as error samples and
/// instability is an absent [`crate::StabilityWindow`]. These variants only surface while
/// loading configuration, connecting collaborators or writing reports.
#[derive(Debug, Error)]
pub enum PerfLabError {
    /// Configuration sources could not be read or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration was readable but holds values the tests cannot run with.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Which key is wrong and why.
        message: String,
    },

    /// The target endpoint could not be turned into a tonic channel.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Prometheus metric registration failed.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Latency histogram could not be created with the requested bounds.
    #[error("histogram error: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    /// The configured request payload is not a valid JSON request message.
    #[error("invalid request payload: {0}")]
    InvalidRequest(#[from] serde_json::Error),

    /// I/O error while writing reports or templates.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A report or template could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PerfLabError {
    /// Creates an `InvalidConfig` variant.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<toml::ser::Error> for PerfLabError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenient result alias for perflab operations.
pub type PerfLabResult<T> = Result<T, PerfLabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message() {
        let err = PerfLabError::invalid_config("search.large_step must be > 0");
        assert_eq!(
            err.to_string(),
            "invalid configuration: search.large_step must be > 0"
        );
    }

    #[test]
    fn test_request_payload_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PerfLabError = parse.into();
        assert!(matches!(err, PerfLabError::InvalidRequest(_)));
    }
}
