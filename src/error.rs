//! Error types shared by the connectors, the file operation facade and the
//! batch engine.
//!
//! Per-file failures inside a batch run are never raised as errors; they are
//! rendered with [`error_message`] into the result ledger instead.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::connection::ConnectionType;

/// Boxed error used to carry client-library failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, RemoteFsError>;

#[derive(Debug, Error)]
pub enum RemoteFsError {
    /// The target file or directory does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// A write without overwrite hit an existing file.
    #[error("file already exists and overwrite is not enabled: {path}")]
    AlreadyExists { path: String },

    /// A protocol client reported a failure.
    #[error("{operation} failed on {server} for {path}")]
    Connector {
        operation: &'static str,
        server: String,
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("{operation} is not supported by {backend} connections")]
    Unsupported {
        backend: ConnectionType,
        operation: &'static str,
    },

    #[error("invalid connection configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("invalid filter pattern {pattern:?}")]
    Filter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot encode text as {encoding}: {reason}")]
    Encoding { encoding: String, reason: String },

    #[error("{operation} failed for {path}")]
    Io {
        operation: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Counter or backup infrastructure failed; aborts the whole batch run.
    #[error("batch item {object_guid} failed during {stage}")]
    BatchFatal {
        object_guid: String,
        stage: &'static str,
        #[source]
        source: Box<RemoteFsError>,
    },
}

impl RemoteFsError {
    pub(crate) fn connector(
        operation: &'static str,
        server: impl Into<String>,
        path: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Connector {
            operation,
            server: server.into(),
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn fatal(object_guid: &str, stage: &'static str, source: Self) -> Self {
        Self::BatchFatal {
            object_guid: object_guid.to_string(),
            stage,
            source: Box::new(source),
        }
    }

    /// True for the missing-target signal used by idempotent deletes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Failures that are answers rather than transient faults.
    pub(crate) fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyExists { .. }
                | Self::Unsupported { .. }
                | Self::InvalidConfig { .. }
                | Self::InvalidInput { .. }
                | Self::Filter { .. }
                | Self::Encoding { .. }
        )
    }
}

/// Renders an error with its full source chain on one line.
pub fn error_message(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_includes_sources() {
        let inner = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = RemoteFsError::connector("read", "ftp.example.com", "/in/a.txt", inner);

        assert_eq!(
            error_message(&err),
            "read failed on ftp.example.com for /in/a.txt: access denied"
        );
    }

    #[test]
    fn test_fatal_wraps_stage_and_cause() {
        let err = RemoteFsError::fatal(
            "G1",
            "counter_write",
            RemoteFsError::AlreadyExists {
                path: "/cfg/G1.json".to_string(),
            },
        );

        assert!(matches!(err, RemoteFsError::BatchFatal { stage: "counter_write", .. }));
        assert!(error_message(&err).starts_with("batch item G1 failed during counter_write: "));
    }

    #[test]
    fn test_not_found_is_permanent() {
        let err = RemoteFsError::NotFound {
            path: "/x".to_string(),
        };
        assert!(err.is_not_found());
        assert!(err.is_permanent());

        let transient = RemoteFsError::io("read", "/x", io::Error::other("reset"));
        assert!(!transient.is_permanent());
    }
}
