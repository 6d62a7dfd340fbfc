//! Error types for marketpulse.
//!
//! Library crates use [`PipelineError`] and [`CollaboratorError`] via `thiserror`.
//! The CLI wraps these with `color-eyre` for rich diagnostics.

use std::error::Error as StdError;
use std::path::PathBuf;

/// Boxed error used as the `source` of collaborator failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Top-level error type for orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Network/HTTP error while fetching source data.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed input data (JSON, HTML, ...).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A collaborator returned a value of the wrong shape for its stage.
    #[error("TypeError: {message}")]
    Shape { message: String },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a shape-contract violation.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Faults raised by an external collaborator during a call.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The collaborator rejected the arguments it was given. The invocation
    /// adapter answers this with one retry using no arguments.
    #[error("arity mismatch: {0}")]
    ArityMismatch(String),

    /// Any other failure inside the collaborator.
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl CollaboratorError {
    /// A failure with no underlying cause.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed {
            message: msg.into(),
            source: None,
        }
    }

    /// A failure wrapping an underlying error.
    pub fn with_source(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Failed {
            message: msg.into(),
            source: Some(source.into()),
        }
    }
}

impl From<PipelineError> for CollaboratorError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Io { path, source } => {
                Self::with_source(format!("I/O error at {path:?}"), source)
            }
            other => Self::failed(other.to_string()),
        }
    }
}

/// Render an error followed by its `source()` chain, one cause per line.
pub fn error_report(err: &(dyn StdError + 'static)) -> String {
    let mut report = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        report.push_str("\n  caused by: ");
        report.push_str(&inner.to_string());
        cause = inner.source();
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PipelineError::config("unknown collaborator 'nope'");
        assert_eq!(err.to_string(), "config error: unknown collaborator 'nope'");

        let err = PipelineError::shape("run_preprocessing must return table/list/iterable");
        assert!(err.to_string().starts_with("TypeError: "));
    }

    #[test]
    fn report_includes_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "feed.json missing");
        let err = CollaboratorError::with_source("could not read feed", io);
        let report = error_report(&err);
        assert!(report.starts_with("could not read feed"));
        assert!(report.contains("caused by: feed.json missing"));
    }

    #[test]
    fn pipeline_error_converts_to_collaborator_failure() {
        let err: CollaboratorError = PipelineError::parse("bad json").into();
        assert!(matches!(err, CollaboratorError::Failed { .. }));
        assert_eq!(error_report(&err), "parse error: bad json");

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CollaboratorError = PipelineError::io("/tmp/feed.json", io).into();
        assert!(error_report(&err).contains("caused by: denied"));
    }
}
