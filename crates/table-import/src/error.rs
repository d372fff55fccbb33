//! Error types for the import library.

use thiserror::Error;

/// Main error type for import operations.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Configuration error (invalid YAML, out-of-range knobs, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No conversion exists between a target column type and a source wire type
    #[error("Unsupported conversion for column {column}: {target_type} from {source_type}")]
    Resolution {
        column: String,
        target_type: String,
        source_type: String,
    },

    /// A single field could not be converted
    #[error("Failed conversion for column {column}")]
    Conversion {
        column: String,
        #[source]
        cause: Box<ImportError>,
    },

    /// Source value cannot be read as the requested type
    #[error("Invalid value: {0}")]
    Value(String),

    /// Table job has no resolved source metadata
    #[error("Table {0} has no source metadata")]
    Metadata(String),

    /// Source database connection, query or fetch error
    #[error("Source database error: {0}")]
    Source(String),

    /// Write to the target store failed
    #[error("Write to {path} failed: {message}")]
    Write {
        path: String,
        message: String,
        retryable: bool,
    },

    /// IO error (file operations, blob streams)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Import was cancelled
    #[error("Import cancelled")]
    Cancelled,
}

impl ImportError {
    /// Create a Resolution error for a target column
    pub fn resolution(
        column: impl Into<String>,
        target_type: impl ToString,
        source_type: impl ToString,
    ) -> Self {
        ImportError::Resolution {
            column: column.into(),
            target_type: target_type.to_string(),
            source_type: source_type.to_string(),
        }
    }

    /// Wrap a field-level error with the target column name
    pub fn conversion(column: impl Into<String>, cause: ImportError) -> Self {
        ImportError::Conversion {
            column: column.into(),
            cause: Box::new(cause),
        }
    }

    /// Create a Write error
    pub fn write(path: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        ImportError::Write {
            path: path.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Create a Value error
    pub fn value(message: impl Into<String>) -> Self {
        ImportError::Value(message.into())
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ImportError::Write { retryable, .. } => *retryable,
            ImportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ImportError::Config(_) | ImportError::Yaml(_) | ImportError::Json(_) => 1,
            ImportError::Resolution { .. }
            | ImportError::Conversion { .. }
            | ImportError::Value(_)
            | ImportError::Metadata(_) => 2,
            ImportError::Source(_) => 3,
            ImportError::Write { .. } => 4,
            ImportError::Cancelled => 5,
            ImportError::Io(_) => 7,
        }
    }

    /// Error and its causes on one line, `outer: inner: ...`.
    pub fn chain_message(&self) -> String {
        let mut output = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            output.push_str(": ");
            output.push_str(&err.to_string());
            source = err.source();
        }
        output
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_column_and_cause() {
        let err = ImportError::conversion("amount", ImportError::value("not a number: abc"));
        assert_eq!(err.to_string(), "Failed conversion for column amount");

        let detailed = err.format_detailed();
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("not a number: abc"));
        assert_eq!(
            err.chain_message(),
            "Failed conversion for column amount: Invalid value: not a number: abc"
        );
    }

    #[test]
    fn test_write_retryable_flag() {
        assert!(ImportError::write("db/t", "overloaded", true).is_retryable());
        assert!(!ImportError::write("db/t", "schema mismatch", false).is_retryable());
        assert!(!ImportError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_io_timeout_is_retryable() {
        let err = ImportError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(err.is_retryable());
        let err = ImportError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ImportError::Config("x".into()).exit_code(), 1);
        let io = ImportError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        assert_eq!(io.exit_code(), 7);
    }
}
