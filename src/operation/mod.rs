//! Operations and their lifecycle.
//!
//! An operation is one unit of work a run performs: render a template,
//! transfer a file, emit a merged collection, run a command or gather
//! facts. Every operation follows the same lifecycle:
//!
//! 1. `prepare` computes and caches whatever the later steps need
//! 2. one of `apply` (mutate), `check` (feasibility) or `diff` (preview)
//! 3. `log` describes the operation for the audit trail
//!
//! Operations that transfer data to a sink negotiate a [`Backend`] with it
//! through [`select_backend`].

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::{Backend, Payload};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::sink::Sink;

mod emit_collection;
mod file_transfer;
mod run_command;
mod run_factor;
mod template;

pub use emit_collection::EmitCollection;
pub use file_transfer::FileTransfer;
pub use run_command::{CommandLine, RunCommand};
pub use run_factor::{FactorType, RunFactor};
pub use template::Template;

/// Position of an operation in a run. Ranks come from configuration, the
/// index breaks ties between operations of the same rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Order {
    pub rank: i64,
    pub index: u32,
}

impl Order {
    pub fn new(rank: i64, index: u32) -> Self {
        Self { rank, index }
    }
}

impl From<i64> for Order {
    fn from(rank: i64) -> Self {
        Self { rank, index: 0 }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.rank, self.index)
    }
}

/// The five kinds of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    #[serde(rename = "template")]
    Template,
    #[serde(rename = "file")]
    FileTransfer,
    #[serde(rename = "collection")]
    EmitCollection,
    #[serde(rename = "command")]
    RunCommand,
    #[serde(rename = "factor")]
    RunFactor,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Template => "template",
            Self::FileTransfer => "file",
            Self::EmitCollection => "collection",
            Self::RunCommand => "command",
            Self::RunFactor => "factor",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Pending,
    Prepared,
    Applied,
}

impl Stage {
    /// Whether prepared state is cached.
    pub fn is_prepared(self) -> bool {
        matches!(self, Self::Prepared | Self::Applied)
    }
}

/// Core trait for operations
///
/// `check`, `diff` and `apply` on an operation that was never prepared log
/// a warning and prepare it first. `prepare` on a prepared operation does
/// nothing. `apply` runs at most once.
pub trait Operation: fmt::Debug {
    fn kind(&self) -> OperationKind;

    fn order(&self) -> Order;

    /// Name of the configuration unit that declared the operation.
    fn package(&self) -> &str;

    /// Backends the operation can produce, in its own preference order.
    /// Empty for operations that do not hand data to a sink.
    fn backends(&self) -> &'static [Backend] {
        &[]
    }

    fn stage(&self) -> Stage;

    /// Compute and cache everything the later steps need.
    fn prepare(&mut self, ctx: &mut Context) -> Result<()>;

    /// Whether the operation could be applied.
    fn check(&mut self, ctx: &mut Context) -> Result<bool>;

    /// Perform the operation.
    fn apply(&mut self, ctx: &mut Context) -> Result<()>;

    /// Describe what `apply` would change. Empty when nothing would.
    fn diff(&mut self, ctx: &mut Context) -> Result<String>;

    /// One-line audit description.
    fn log(&self) -> String;
}

/// A boxed operation for type-erased storage
pub type BoxedOperation = Box<dyn Operation>;

/// Prepare `op` if nobody did, warning about it.
pub(crate) fn ensure_prepared<O: Operation + ?Sized>(
    op: &mut O,
    ctx: &mut Context,
    step: &str,
) -> Result<()> {
    if !op.stage().is_prepared() {
        log::warn!(
            "prepare was not called before {step} of {} operation `{}`, preparing now",
            op.kind(),
            op.log()
        );
        op.prepare(ctx)?;
    }
    Ok(())
}

/// [`ensure_prepared`], then refuse a second apply.
pub(crate) fn begin_apply<O: Operation + ?Sized>(op: &mut O, ctx: &mut Context) -> Result<()> {
    ensure_prepared(op, ctx, "apply")?;
    if op.stage() == Stage::Applied {
        return Err(Error::Internal(format!(
            "{} operation `{}` was already applied",
            op.kind(),
            op.log()
        )));
    }
    Ok(())
}

/// Pick the backend to hand data to `sink` with.
///
/// The sink's preference order wins; `supported` only says what the
/// operation can produce.
pub fn select_backend(
    kind: OperationKind,
    supported: &[Backend],
    sink: &dyn Sink,
) -> Result<Backend> {
    let required = sink.requires();
    let selected = required.iter().find(|b| supported.contains(*b)).copied();

    match selected {
        Some(backend) => {
            log::debug!("{kind} operation selected backend {backend} for sink {sink}");
            Ok(backend)
        }
        None => Err(Error::NoMatchingBackend {
            operation: kind,
            sink: sink.to_string(),
            offered: supported.to_vec(),
            required: required.to_vec(),
        }),
    }
}

/// Materialize `file` for `backend`.
///
/// `File` yields the absolute path without touching the file. `Text` reads
/// the content, which requires a regular file. Content that is not UTF-8
/// comes back as [`Payload::Bytes`], unchanged.
pub fn prepare_file_for_backend(file: &Path, backend: Backend) -> Result<Payload> {
    match backend {
        Backend::File => {
            let absolute = std::path::absolute(file).map_err(|e| Error::io(file, e))?;
            Ok(Payload::Path(absolute))
        }
        Backend::Text => {
            let metadata = match fs::metadata(file) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::MissingSource {
                        path: file.to_path_buf(),
                    });
                }
                Err(e) => return Err(Error::io(file, e)),
            };

            if metadata.is_dir() {
                return Err(Error::InvalidSource {
                    path: file.to_path_buf(),
                    reason: "is a directory".into(),
                });
            }
            if !metadata.is_file() {
                return Err(Error::InvalidSource {
                    path: file.to_path_buf(),
                    reason: "is not a regular file".into(),
                });
            }

            let content = fs::read(file).map_err(|e| Error::io(file, e))?;
            Ok(match String::from_utf8(content) {
                Ok(text) => Payload::Text(text),
                Err(e) => Payload::Bytes(e.into_bytes()),
            })
        }
    }
}

/// Last modification time of `path`.
pub(crate) fn modified(path: &Path) -> Result<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .map_err(|e| Error::io(path, e))
}

/// Whether `path` is an existing regular file.
pub(crate) fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file())
}
