//! Render a template in the compartment and hand the text to a sink.

use std::path::{Path, PathBuf};

use compartment::{Binding, Bindings, Delimiters, RenderError};

use super::{
    Operation, OperationKind, Order, Stage, begin_apply, ensure_prepared, is_regular_file,
    modified,
};
use crate::backend::{Backend, Payload};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::paths;
use crate::sink::{BoxedSink, DiffHeader};

/// Renders `template` against the context's facts, packages and automatic
/// facts.
#[derive(Debug)]
pub struct Template {
    order: Order,
    package: String,
    template: PathBuf,
    sink: BoxedSink,
    delimiters: Option<Delimiters>,
    preamble: Option<String>,
    content: Option<String>,
    stage: Stage,
}

impl Template {
    /// `~` and environment variables in `template` are expanded.
    pub fn new(
        order: impl Into<Order>,
        package: impl Into<String>,
        template: impl AsRef<Path>,
        sink: BoxedSink,
    ) -> Self {
        Self {
            order: order.into(),
            package: package.into(),
            template: paths::expand(&template.as_ref().to_string_lossy()),
            sink,
            delimiters: None,
            preamble: None,
            content: None,
            stage: Stage::Pending,
        }
    }

    /// Use custom fragment delimiters instead of `{ }`.
    #[must_use]
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = Some(delimiters);
        self
    }

    /// Lua code that runs before the first fragment.
    #[must_use]
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Rendered text, once prepared.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    fn payload(&self) -> Result<Payload> {
        self.content.clone().map(Payload::Text).ok_or_else(|| {
            Error::Internal(format!(
                "template {} has no content",
                self.template.display()
            ))
        })
    }

    fn render_error(&self, err: &RenderError) -> Error {
        Error::TemplateRender {
            path: self.template.clone(),
            line: err.line(),
            message: err.to_string(),
        }
    }
}

/// Declare every top-level key of `data` with the binding its shape calls
/// for.
pub(crate) fn bindings_for(data: &toml::Table) -> Result<Bindings> {
    let mut bindings = Bindings::new();
    for (key, value) in data {
        let binding = match value {
            toml::Value::String(_)
            | toml::Value::Integer(_)
            | toml::Value::Float(_)
            | toml::Value::Boolean(_) => Binding::Scalar(value.clone()),
            toml::Value::Array(items) => Binding::Sequence(items.clone()),
            toml::Value::Table(table) => Binding::Mapping(table.clone()),
            toml::Value::Datetime(_) => {
                return Err(Error::UnsupportedDataShape {
                    key: key.clone(),
                    shape: value.type_str().to_string(),
                });
            }
        };
        let shape = binding.shape();
        bindings
            .declare(key, binding)
            .map_err(|e| Error::UnsupportedDataShape {
                key: key.clone(),
                shape: format!("{shape} ({e})"),
            })?;
    }
    Ok(bindings)
}

impl Operation for Template {
    fn kind(&self) -> OperationKind {
        OperationKind::Template
    }

    fn order(&self) -> Order {
        self.order
    }

    fn package(&self) -> &str {
        &self.package
    }

    fn backends(&self) -> &'static [Backend] {
        &[Backend::Text]
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn prepare(&mut self, ctx: &mut Context) -> Result<()> {
        if self.stage.is_prepared() {
            return Ok(());
        }
        if !is_regular_file(&self.template) {
            return Err(Error::MissingSource {
                path: self.template.clone(),
            });
        }

        let bindings = bindings_for(&ctx.template_data())?;
        let parsed = compartment::Template::from_file(&self.template, self.delimiters.as_ref())
            .map_err(|e| self.render_error(&e))?;
        let content = parsed
            .render(&bindings, self.preamble.as_deref())
            .map_err(|e| self.render_error(&e))?;

        log::debug!(
            "Rendered {} into {} bytes",
            self.template.display(),
            content.len()
        );
        self.content = Some(content);
        self.stage = Stage::Prepared;
        Ok(())
    }

    fn check(&mut self, ctx: &mut Context) -> Result<bool> {
        ensure_prepared(self, ctx, "check")?;
        Ok(self.sink.check(&self.payload()?, ctx))
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<()> {
        begin_apply(self, ctx)?;
        let payload = self.payload()?;
        self.sink
            .emit(&payload, ctx)
            .map_err(|e| Error::sink(&self.sink, e))?;
        self.stage = Stage::Applied;
        Ok(())
    }

    fn diff(&mut self, ctx: &mut Context) -> Result<String> {
        ensure_prepared(self, ctx, "diff")?;
        let header = DiffHeader::new(
            self.template.display().to_string(),
            modified(&self.template)?,
        );
        self.sink
            .diff(&self.payload()?, ctx, &header)
            .map_err(|e| Error::sink(&self.sink, e))
    }

    fn log(&self) -> String {
        format!(
            "Applying `{}` to `{}`",
            self.template.display(),
            self.sink
        )
    }
}
