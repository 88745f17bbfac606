//! Hand a source file to a sink, by path or by content.

use std::path::{Path, PathBuf};

use super::{
    Operation, OperationKind, Order, Stage, begin_apply, ensure_prepared, modified,
    prepare_file_for_backend, select_backend,
};
use crate::backend::{Backend, Payload};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::paths;
use crate::sink::{BoxedSink, DiffHeader};

const BACKENDS: &[Backend] = &[Backend::File, Backend::Text];

/// Transfers `source` to a sink over whichever backend the sink prefers.
#[derive(Debug)]
pub struct FileTransfer {
    order: Order,
    package: String,
    source: PathBuf,
    sink: BoxedSink,
    payload: Option<Payload>,
    stage: Stage,
}

impl FileTransfer {
    /// `~` and environment variables in `source` are expanded.
    pub fn new(
        order: impl Into<Order>,
        package: impl Into<String>,
        source: impl AsRef<Path>,
        sink: BoxedSink,
    ) -> Self {
        Self {
            order: order.into(),
            package: package.into(),
            source: paths::expand(&source.as_ref().to_string_lossy()),
            sink,
            payload: None,
            stage: Stage::Pending,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The negotiated payload, once prepared.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    fn prepared_payload(&self) -> Result<&Payload> {
        self.payload.as_ref().ok_or_else(|| {
            Error::Internal(format!("{} has no payload", self.source.display()))
        })
    }
}

impl Operation for FileTransfer {
    fn kind(&self) -> OperationKind {
        OperationKind::FileTransfer
    }

    fn order(&self) -> Order {
        self.order
    }

    fn package(&self) -> &str {
        &self.package
    }

    fn backends(&self) -> &'static [Backend] {
        BACKENDS
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn prepare(&mut self, _ctx: &mut Context) -> Result<()> {
        if self.stage.is_prepared() {
            return Ok(());
        }
        let backend = select_backend(self.kind(), BACKENDS, self.sink.as_ref())?;
        self.payload = Some(prepare_file_for_backend(&self.source, backend)?);
        self.stage = Stage::Prepared;
        Ok(())
    }

    fn check(&mut self, ctx: &mut Context) -> Result<bool> {
        ensure_prepared(self, ctx, "check")?;
        Ok(self.sink.check(self.prepared_payload()?, ctx))
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<()> {
        begin_apply(self, ctx)?;
        let payload = self.prepared_payload()?.clone();
        self.sink
            .emit(&payload, ctx)
            .map_err(|e| Error::sink(&self.sink, e))?;
        self.stage = Stage::Applied;
        Ok(())
    }

    fn diff(&mut self, ctx: &mut Context) -> Result<String> {
        ensure_prepared(self, ctx, "diff")?;
        let header = DiffHeader::new(self.source.display().to_string(), modified(&self.source)?);
        self.sink
            .diff(self.prepared_payload()?, ctx, &header)
            .map_err(|e| Error::sink(&self.sink, e))
    }

    fn log(&self) -> String {
        format!("Linking `{}` to `{}`", self.source.display(), self.sink)
    }
}
