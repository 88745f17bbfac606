//! Error types for template rendering and unit loading.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Where in a template an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// The preamble that runs before the first fragment.
    Preamble,
    /// A template line (1-based), the line the fragment starts on.
    Line(usize),
}

impl Location {
    /// The template line, if the error is tied to one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Preamble => None,
            Self::Line(line) => Some(*line),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preamble => write!(f, "preamble"),
            Self::Line(line) => write!(f, "line {line}"),
        }
    }
}

/// Errors raised while parsing or rendering a template.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The template file could not be read.
    #[error("cannot read template {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed template text or a fragment that does not compile.
    #[error("syntax error at {at}: {message}")]
    Syntax { at: Location, message: String },

    /// A fragment raised an error while running.
    #[error("runtime error at {at}: {message}")]
    Runtime { at: Location, message: String },

    /// A fragment produced a value that has no text form.
    #[error("broken substitution at {at}: fragment produced a {type_name}")]
    Substitution {
        at: Location,
        type_name: &'static str,
    },

    /// A binding name cannot be declared in the compartment.
    #[error("cannot bind `{name}`: {reason}")]
    Binding { name: String, reason: String },

    /// The interpreter itself could not be set up.
    #[error("compartment setup failed: {0}")]
    Vm(String),
}

impl RenderError {
    /// Template line the error refers to, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { at, .. } | Self::Runtime { at, .. } | Self::Substitution { at, .. } => {
                at.line()
            }
            _ => None,
        }
    }
}

impl From<mlua::Error> for RenderError {
    fn from(err: mlua::Error) -> Self {
        Self::Vm(err.to_string())
    }
}

/// Errors raised while loading a fact unit.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// The unit file could not be read.
    #[error("cannot read unit {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The unit does not compile.
    #[error("cannot load unit: {0}")]
    Load(String),

    /// The unit raised an error while running.
    #[error("unit failed: {0}")]
    Run(String),

    /// The unit produced something other than a table of facts.
    #[error("unit returned a {0}, expected a table of facts")]
    NotAMapping(&'static str),

    /// The facts table holds values TOML cannot represent.
    #[error("unit facts cannot be converted: {0}")]
    Convert(String),
}
