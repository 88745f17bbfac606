//! Discover facts and merge them into the context.
//!
//! Factors run during `prepare`, so the facts they report are visible to
//! every operation ordered after them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Operation, OperationKind, Order, Stage, begin_apply, ensure_prepared};
use crate::context::Context;
use crate::error::{Error, FactorFailure, Result};
use crate::paths;

/// How a factor file is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorType {
    /// A Lua unit evaluated in-process.
    #[default]
    Lua,
    /// An executable whose standard output is a TOML table.
    Script,
}

impl fmt::Display for FactorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lua => write!(f, "lua"),
            Self::Script => write!(f, "script"),
        }
    }
}

impl FromStr for FactorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lua" => Ok(Self::Lua),
            "script" => Ok(Self::Script),
            other => Err(Error::UnknownFactorType(other.to_string())),
        }
    }
}

/// Runs a factor once and merges what it reports into the automatic facts.
#[derive(Debug)]
pub struct RunFactor {
    order: Order,
    package: String,
    path: PathBuf,
    factor_type: FactorType,
    stage: Stage,
}

impl RunFactor {
    /// `~` and environment variables in `path` are expanded.
    pub fn new(
        order: impl Into<Order>,
        package: impl Into<String>,
        path: impl AsRef<Path>,
        factor_type: FactorType,
    ) -> Self {
        Self {
            order: order.into(),
            package: package.into(),
            path: paths::expand(&path.as_ref().to_string_lossy()),
            factor_type,
            stage: Stage::Pending,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn factor_type(&self) -> FactorType {
        self.factor_type
    }

    fn run_unit(&self) -> Result<toml::Table> {
        compartment::load_unit(&self.path).map_err(|e| Error::FactorExec {
            path: self.path.clone(),
            failure: FactorFailure::Unit(e.to_string()),
        })
    }

    fn run_script(&self) -> Result<toml::Table> {
        let program = std::path::absolute(&self.path).map_err(|e| Error::FactorExec {
            path: self.path.clone(),
            failure: FactorFailure::Spawn(e),
        })?;
        log::debug!("Running factor script {}", program.display());
        let output = Command::new(&program)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| Error::FactorExec {
                path: self.path.clone(),
                failure: FactorFailure::Spawn(e),
            })?;

        if !output.status.success() {
            return Err(Error::FactorExec {
                path: self.path.clone(),
                failure: failure_of(output.status),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        toml::from_str::<toml::Table>(&stdout).map_err(|e| Error::FactorParse {
            path: self.path.clone(),
            message: e.message().to_string(),
            output: stdout.clone(),
        })
    }
}

fn failure_of(status: ExitStatus) -> FactorFailure {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return FactorFailure::Signal(signal);
        }
    }
    FactorFailure::ExitCode(status.code().unwrap_or(-1))
}

impl Operation for RunFactor {
    fn kind(&self) -> OperationKind {
        OperationKind::RunFactor
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
        let discovered = match self.factor_type {
            FactorType::Lua => self.run_unit()?,
            FactorType::Script => self.run_script()?,
        };
        log::debug!(
            "Factor {} discovered {} facts",
            self.path.display(),
            discovered.len()
        );
        ctx.merge_automatic(discovered);
        self.stage = Stage::Prepared;
        Ok(())
    }

    fn check(&mut self, ctx: &mut Context) -> Result<bool> {
        ensure_prepared(self, ctx, "check")?;
        Ok(true)
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<()> {
        begin_apply(self, ctx)?;
        self.stage = Stage::Applied;
        Ok(())
    }

    fn diff(&mut self, ctx: &mut Context) -> Result<String> {
        ensure_prepared(self, ctx, "diff")?;
        Ok(String::new())
    }

    fn log(&self) -> String {
        format!(
            "Already executed factor `{}` of type `{}`",
            self.path.display(),
            self.factor_type
        )
    }
}
