//! Error types for operation execution.
//!
//! Every lifecycle method fails with one of these. Errors are grouped into
//! categories so callers can decide how to report them without matching on
//! every variant.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use crate::backend::{Backend, join_backends};
use crate::operation::OperationKind;
use crate::sink::SinkError;

/// Result type alias for operation execution.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Operation and sink share no backend.
    Negotiation,
    /// A source file is missing or unusable.
    Source,
    /// Template binding or rendering failed.
    Template,
    /// Collection lookup or merge failed.
    Collection,
    /// An external command failed.
    Command,
    /// A factor failed to run or report facts.
    Factor,
    /// The sink collaborator failed.
    Sink,
    /// A lifecycle contract was violated.
    Internal,
}

impl ErrorCategory {
    /// Get a user-friendly description of this category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Negotiation => "No compatible transfer mode",
            Self::Source => "Unusable source file",
            Self::Template => "Template failure",
            Self::Collection => "Collection failure",
            Self::Command => "Command failure",
            Self::Factor => "Factor failure",
            Self::Sink => "Sink failure",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// How a factor failed before it could report facts.
#[derive(Debug, thiserror::Error)]
pub enum FactorFailure {
    /// The script could not be started.
    #[error("could not be started: {0}")]
    Spawn(#[source] io::Error),

    /// The script was terminated by a signal.
    #[error("was killed by signal {0}")]
    Signal(i32),

    /// The script exited with a non-zero status.
    #[error("exited with status {0}")]
    ExitCode(i32),

    /// The in-process unit failed to load or run.
    #[error("failed: {0}")]
    Unit(String),
}

/// Errors raised by operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation can produce none of the backends the sink accepts.
    #[error(
        "{operation} operation offers [{}] but sink {sink} requires [{}]",
        join_backends(.offered),
        join_backends(.required)
    )]
    NoMatchingBackend {
        operation: OperationKind,
        sink: String,
        offered: Vec<Backend>,
        required: Vec<Backend>,
    },

    /// The source exists but cannot be transferred as content.
    #[error("invalid source {}: {reason}", .path.display())]
    InvalidSource { path: PathBuf, reason: String },

    /// The source does not exist or is not a regular file.
    #[error("missing source {}: not a regular file", .path.display())]
    MissingSource { path: PathBuf },

    /// A template binding has a shape the compartment cannot declare.
    #[error("template data `{key}` has unsupported shape {shape}")]
    UnsupportedDataShape { key: String, shape: String },

    /// Sandboxed rendering failed.
    #[error(
        "cannot render {}{}: {message}",
        .path.display(),
        .line.map(|l| format!(":{l}")).unwrap_or_default()
    )]
    TemplateRender {
        path: PathBuf,
        line: Option<usize>,
        message: String,
    },

    /// The named collection is not in the context.
    #[error("unknown collection `{name}`")]
    UnknownCollection { name: String },

    /// The merger strategy could not combine the fragments.
    #[error("cannot merge collection `{name}`: {message}")]
    CollectionMerge { name: String, message: String },

    /// A command ran and exited unsuccessfully.
    #[error("command `{command}` in {} failed: {status}", .dir.display())]
    CommandFailed {
        command: String,
        dir: PathBuf,
        status: ExitStatus,
    },

    /// A command could not be started.
    #[error("cannot start command `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A command line that cannot be executed at all.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A factor failed before reporting facts.
    #[error("factor {} {failure}", .path.display())]
    FactorExec {
        path: PathBuf,
        #[source]
        failure: FactorFailure,
    },

    /// A factor script printed something that is not a TOML table.
    #[error("factor {} printed invalid TOML ({message}):\n{output}", .path.display())]
    FactorParse {
        path: PathBuf,
        output: String,
        message: String,
    },

    /// Factor type name other than `lua` or `script`.
    #[error("unknown factor type `{0}`")]
    UnknownFactorType(String),

    /// The sink collaborator reported a failure.
    #[error("sink {sink} failed: {source}")]
    Sink {
        sink: String,
        #[source]
        source: SinkError,
    },

    /// Filesystem access failed.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A lifecycle contract was violated by the caller.
    #[error("internal error: {0}")]
    Internal(String),

    /// A failure attributed to one operation of a run.
    #[error("{kind} operation from package `{package}` failed ({description}): {source}")]
    Operation {
        kind: OperationKind,
        package: String,
        description: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a sink error naming the sink.
    pub fn sink(sink: impl fmt::Display, source: SinkError) -> Self {
        Self::Sink {
            sink: sink.to_string(),
            source,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NoMatchingBackend { .. } => ErrorCategory::Negotiation,
            Error::InvalidSource { .. } | Error::MissingSource { .. } | Error::Io { .. } => {
                ErrorCategory::Source
            }
            Error::UnsupportedDataShape { .. } | Error::TemplateRender { .. } => {
                ErrorCategory::Template
            }
            Error::UnknownCollection { .. } | Error::CollectionMerge { .. } => {
                ErrorCategory::Collection
            }
            Error::CommandFailed { .. } | Error::CommandSpawn { .. } | Error::InvalidCommand(_) => {
                ErrorCategory::Command
            }
            Error::FactorExec { .. } | Error::FactorParse { .. } | Error::UnknownFactorType(_) => {
                ErrorCategory::Factor
            }
            Error::Sink { .. } => ErrorCategory::Sink,
            Error::Internal(_) => ErrorCategory::Internal,
            Error::Operation { source, .. } => source.category(),
        }
    }

    /// Whether this error signals a programming mistake rather than bad input.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.category() == ErrorCategory::Internal
    }

    /// The error without any run-driver attribution.
    pub fn root(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_matching_backend_display() {
        let err = Error::NoMatchingBackend {
            operation: OperationKind::Template,
            sink: "link ~/.zshrc".to_string(),
            offered: vec![Backend::Text],
            required: vec![Backend::File],
        };
        let msg = err.to_string();
        assert!(msg.contains("template operation offers [text]"));
        assert!(msg.contains("sink link ~/.zshrc requires [file]"));
        assert_eq!(err.category(), ErrorCategory::Negotiation);
    }

    #[test]
    fn test_template_render_display_with_line() {
        let err = Error::TemplateRender {
            path: PathBuf::from("/etc/tmpl"),
            line: Some(4),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "cannot render /etc/tmpl:4: boom");

        let err = Error::TemplateRender {
            path: PathBuf::from("/etc/tmpl"),
            line: None,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "cannot render /etc/tmpl: boom");
    }

    #[test]
    fn test_factor_failure_display() {
        let err = Error::FactorExec {
            path: PathBuf::from("/opt/facts.sh"),
            failure: FactorFailure::Signal(9),
        };
        assert_eq!(err.to_string(), "factor /opt/facts.sh was killed by signal 9");

        let err = Error::FactorExec {
            path: PathBuf::from("/opt/facts.sh"),
            failure: FactorFailure::ExitCode(1),
        };
        assert!(err.to_string().contains("exited with status 1"));
    }

    #[test]
    fn test_operation_wrapper_keeps_category() {
        let err = Error::Operation {
            kind: OperationKind::RunCommand,
            package: "base".into(),
            description: "Executing unsafe shell command `false`".into(),
            source: Box::new(Error::InvalidCommand("empty".into())),
        };
        assert_eq!(err.category(), ErrorCategory::Command);
        assert!(matches!(err.root(), Error::InvalidCommand(_)));
        assert!(err.to_string().contains("package `base`"));
    }

    #[test]
    fn test_internal_errors() {
        assert!(Error::Internal("double apply".into()).is_internal());
        assert!(!Error::UnknownCollection { name: "x".into() }.is_internal());
    }

    #[test]
    fn test_category_description() {
        assert!(!ErrorCategory::Factor.description().is_empty());
        assert_eq!(format!("{}", ErrorCategory::Sink), "Sink failure");
    }
}
