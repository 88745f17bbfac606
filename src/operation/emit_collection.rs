//! Merge a named collection and emit the result as text.

use chrono::Utc;

use super::{Operation, OperationKind, Order, Stage, begin_apply, ensure_prepared};
use crate::backend::Payload;
use crate::collection::BoxedMerger;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::sink::{BoxedSink, DiffHeader};

/// Emits the merged fragments of one collection.
///
/// The merge is recomputed by every `check`, `apply` and `diff`, so repeated
/// calls always see the same result for the same context.
#[derive(Debug)]
pub struct EmitCollection {
    order: Order,
    package: String,
    collection: String,
    merger: BoxedMerger,
    sink: BoxedSink,
    data: Option<String>,
    stage: Stage,
}

impl EmitCollection {
    pub fn new(
        order: impl Into<Order>,
        package: impl Into<String>,
        collection: impl Into<String>,
        merger: BoxedMerger,
        sink: BoxedSink,
    ) -> Self {
        Self {
            order: order.into(),
            package: package.into(),
            collection: collection.into(),
            merger,
            sink,
            data: None,
            stage: Stage::Pending,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Text of the most recent merge.
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    fn merge(&mut self, ctx: &Context) -> Result<Payload> {
        let fragments = ctx
            .collection(&self.collection)
            .ok_or_else(|| Error::UnknownCollection {
                name: self.collection.clone(),
            })?;
        let merged = self
            .merger
            .merge(&self.collection, fragments)
            .map_err(|e| Error::CollectionMerge {
                name: self.collection.clone(),
                message: e.to_string(),
            })?;

        log::debug!(
            "Merged {} fragments of collection `{}` with {:?}",
            fragments.len(),
            self.collection,
            self.merger
        );
        self.data = Some(merged.clone());
        Ok(Payload::Text(merged))
    }
}

impl Operation for EmitCollection {
    fn kind(&self) -> OperationKind {
        OperationKind::EmitCollection
    }

    fn order(&self) -> Order {
        self.order
    }

    fn package(&self) -> &str {
        &self.package
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn prepare(&mut self, ctx: &mut Context) -> Result<()> {
        if self.stage.is_prepared() {
            return Ok(());
        }
        if ctx.collection(&self.collection).is_none() {
            return Err(Error::UnknownCollection {
                name: self.collection.clone(),
            });
        }
        self.stage = Stage::Prepared;
        Ok(())
    }

    fn check(&mut self, ctx: &mut Context) -> Result<bool> {
        ensure_prepared(self, ctx, "check")?;
        let payload = self.merge(ctx)?;
        Ok(self.sink.check(&payload, ctx))
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<()> {
        begin_apply(self, ctx)?;
        let payload = self.merge(ctx)?;
        self.sink
            .emit(&payload, ctx)
            .map_err(|e| Error::sink(&self.sink, e))?;
        self.stage = Stage::Applied;
        Ok(())
    }

    fn diff(&mut self, ctx: &mut Context) -> Result<String> {
        ensure_prepared(self, ctx, "diff")?;
        let payload = self.merge(ctx)?;
        let header = DiffHeader::new(format!("Collection {}", self.collection), Utc::now());
        self.sink
            .diff(&payload, ctx, &header)
            .map_err(|e| Error::sink(&self.sink, e))
    }

    fn log(&self) -> String {
        format!("Emitting collection `{}`", self.sink)
    }
}
