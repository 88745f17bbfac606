//! # provision
//!
//! Execution core for declarative machine configuration.
//!
//! A resolver (not part of this crate) turns configuration into a list of
//! [`Operation`]s, each bound to a [`Sink`] where it transfers data. This
//! crate runs them:
//!
//! - [`Template`] renders a template in a sandboxed Lua compartment
//! - [`FileTransfer`] hands a file to a sink by path or by content
//! - [`EmitCollection`] merges fragments contributed by several packages
//! - [`RunCommand`] runs an external command
//! - [`RunFactor`] discovers facts for later operations
//!
//! ```no_run
//! use provision::{Context, Mode, runner};
//!
//! # fn resolve(_: &Context) -> Vec<provision::BoxedOperation> { Vec::new() }
//! let mut ctx = Context::load_default()?;
//! let operations = resolve(&ctx);
//! let report = runner::run(operations, &mut ctx, Mode::Diff)?;
//! for (entry, diff) in report.diffs() {
//!     println!("{}\n{diff}", entry.description);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod backend;
pub mod collection;
pub mod context;
pub mod error;
pub mod merge;
pub mod operation;
pub mod paths;
pub mod runner;
pub mod sink;

#[cfg(test)]
mod testutil;

pub use backend::{Backend, Payload};
pub use collection::{BoxedMerger, Concat, FnMerger, MergeError, Merger, TomlMerge};
pub use context::{Collection, Context};
pub use error::{Error, ErrorCategory, FactorFailure, Result};
pub use operation::{
    BoxedOperation, CommandLine, EmitCollection, FactorType, FileTransfer, Operation,
    OperationKind, Order, RunCommand, RunFactor, Stage, Template, prepare_file_for_backend,
    select_backend,
};
pub use runner::{Mode, Outcome, RunReport};
pub use sink::{BoxedSink, DiffHeader, Sink, SinkError};

/// Re-exported so resolvers can build template options without a direct
/// dependency on the compartment crate.
pub use compartment::Delimiters;
