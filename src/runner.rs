//! Run driver: takes a set of operations through their lifecycle, in order.
//!
//! Operations run strictly one after another, sorted by [`Order`]. Errors in
//! `prepare` and `apply` stop the run. Failed checks are collected and the
//! run continues.

use std::fmt;

use serde::Serialize;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::operation::{BoxedOperation, Operation, OperationKind, Order};

/// What a run does with each operation after preparing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Perform every operation.
    Apply,
    /// Verify every operation could be performed.
    #[default]
    Check,
    /// Preview what every operation would change.
    Diff,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Check => write!(f, "check"),
            Self::Diff => write!(f, "diff"),
        }
    }
}

/// Result of one operation within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The operation was performed.
    Applied,
    /// The check passed.
    Passed,
    /// The check failed, with the error if there was one.
    CheckFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// The operation would change something.
    Changed { diff: String },
    /// The operation would change nothing.
    Unchanged,
}

impl Outcome {
    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::CheckFailed { .. })
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub order: Order,
    pub kind: OperationKind,
    pub package: String,
    pub description: String,
    pub outcome: Outcome,
}

/// Everything a run did, in execution order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub entries: Vec<Entry>,
}

impl RunReport {
    /// Entries whose check failed.
    pub fn failed_checks(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| !e.outcome.is_success())
    }

    /// Non-empty diffs, with the entry they belong to.
    pub fn diffs(&self) -> impl Iterator<Item = (&Entry, &str)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            Outcome::Changed { diff } => Some((e, diff.as_str())),
            _ => None,
        })
    }

    /// Check if the run was fully successful (no failed checks)
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_success())
    }
}

/// Run `operations` against `ctx`.
///
/// The context is shared by every operation, so facts discovered by a
/// factor are visible to everything ordered after it.
pub fn run(
    mut operations: Vec<BoxedOperation>,
    ctx: &mut Context,
    mode: Mode,
) -> Result<RunReport> {
    operations.sort_by_key(|op| op.order());
    log::debug!("Running {} operations in {mode} mode", operations.len());

    let mut report = RunReport {
        mode,
        entries: Vec::with_capacity(operations.len()),
    };

    for op in &mut operations {
        op.prepare(ctx).map_err(|e| attribute(op.as_ref(), e))?;

        let outcome = match mode {
            Mode::Apply => {
                op.apply(ctx).map_err(|e| attribute(op.as_ref(), e))?;
                Outcome::Applied
            }
            Mode::Check => match op.check(ctx) {
                Ok(true) => Outcome::Passed,
                Ok(false) => Outcome::CheckFailed { error: None },
                Err(e) => {
                    log::warn!("Check of `{}` failed: {e}", op.log());
                    Outcome::CheckFailed {
                        error: Some(e.to_string()),
                    }
                }
            },
            Mode::Diff => {
                let diff = op.diff(ctx).map_err(|e| attribute(op.as_ref(), e))?;
                if diff.is_empty() {
                    Outcome::Unchanged
                } else {
                    Outcome::Changed { diff }
                }
            }
        };

        let description = op.log();
        log::info!("{description}");
        report.entries.push(Entry {
            order: op.order(),
            kind: op.kind(),
            package: op.package().to_string(),
            description,
            outcome,
        });
    }

    Ok(report)
}

/// Wrap `err` with the identity of the operation that raised it.
fn attribute(op: &dyn Operation, err: Error) -> Error {
    Error::Operation {
        kind: op.kind(),
        package: op.package().to_string(),
        description: op.log(),
        source: Box::new(err),
    }
}
