//! The sink contract consumed by operations.
//!
//! Sinks are destinations (a symlinked dotfile, a file in a managed
//! directory, ...). They are implemented outside this crate; operations only
//! negotiate a backend with them and hand over a [`Payload`].

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use similar::TextDiff;

use crate::backend::{Backend, Payload};
use crate::context::Context;

/// Error type sinks report through.
pub type SinkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A destination that can receive data over one or more backends.
///
/// `Display` is the sink's human-readable identity, used in audit lines and
/// error messages.
pub trait Sink: fmt::Display + fmt::Debug {
    /// Accepted backends, most preferred first.
    fn requires(&self) -> &[Backend];

    /// Write `payload` to the destination.
    fn emit(&mut self, payload: &Payload, ctx: &Context) -> Result<(), SinkError>;

    /// Whether `payload` could be emitted.
    fn check(&self, payload: &Payload, ctx: &Context) -> bool;

    /// Describe how the destination differs from `payload`.
    fn diff(&self, payload: &Payload, ctx: &Context, header: &DiffHeader)
    -> Result<String, SinkError>;

    /// Filesystem location of the destination.
    fn path(&self) -> &Path;
}

/// A boxed sink for type-erased storage
pub type BoxedSink = Box<dyn Sink>;

/// Labels for the "A" side of a diff: where the new data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHeader {
    pub filename_a: String,
    pub mtime_a: DateTime<Utc>,
}

impl DiffHeader {
    pub fn new(filename_a: impl Into<String>, mtime_a: DateTime<Utc>) -> Self {
        Self {
            filename_a: filename_a.into(),
            mtime_a,
        }
    }

    /// Header line for the A side, `name<TAB>timestamp`.
    pub fn label(&self) -> String {
        format!("{}\t{}", self.filename_a, self.mtime_a.to_rfc2822())
    }
}

/// Unified diff from the operation's content (A) to the sink's current
/// content (B). Returns an empty string when both sides are equal.
///
/// Sinks may use this to implement [`Sink::diff`] for text content.
pub fn unified_diff(new: &str, header: &DiffHeader, current: &str, filename_b: &str) -> String {
    if new == current {
        return String::new();
    }
    TextDiff::from_lines(new, current)
        .unified_diff()
        .context_radius(3)
        .header(&header.label(), filename_b)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header() -> DiffHeader {
        DiffHeader::new("templates/zshrc", Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }

    #[test]
    fn test_header_label() {
        assert_eq!(header().label(), "templates/zshrc\tTue, 2 Jan 2024 03:04:05 +0000");
    }

    #[test]
    fn test_unified_diff_identical_is_empty() {
        assert_eq!(unified_diff("a\nb\n", &header(), "a\nb\n", "/home/u/.zshrc"), "");
    }

    #[test]
    fn test_unified_diff_marks_changes() {
        let diff = unified_diff("a\nnew\n", &header(), "a\nold\n", "/home/u/.zshrc");
        assert!(diff.starts_with("--- templates/zshrc\t"));
        assert!(diff.contains("+++ /home/u/.zshrc"));
        assert!(diff.contains("-new"));
        assert!(diff.contains("+old"));
    }
}
