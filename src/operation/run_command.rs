//! Run an external command in a working directory.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use super::{Operation, OperationKind, Order, Stage, begin_apply, ensure_prepared};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::paths;

/// A command as written in configuration.
///
/// ```toml
/// command = ["make", "install"]     # safe: executed without a shell
/// command = "make install | tee log" # unsafe: run through `sh -c`
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Argv(Vec<String>),
    Shell(String),
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argv(argv) => write!(f, "{}", argv.join(" ")),
            Self::Shell(expr) => write!(f, "{expr}"),
        }
    }
}

/// Runs a command. The working directory applies to the child only.
#[derive(Debug)]
pub struct RunCommand {
    order: Order,
    package: String,
    command: CommandLine,
    basedir: Option<PathBuf>,
    stage: Stage,
}

impl RunCommand {
    pub fn new(order: impl Into<Order>, package: impl Into<String>, command: CommandLine) -> Self {
        Self {
            order: order.into(),
            package: package.into(),
            command,
            basedir: None,
            stage: Stage::Pending,
        }
    }

    /// Run in `basedir` instead of the current directory. `~` and
    /// environment variables are expanded.
    #[must_use]
    pub fn in_dir(mut self, basedir: impl AsRef<Path>) -> Self {
        self.basedir = Some(paths::expand(&basedir.as_ref().to_string_lossy()));
        self
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    fn working_dir(&self) -> Result<PathBuf> {
        match &self.basedir {
            Some(dir) => Ok(dir.clone()),
            None => env::current_dir().map_err(|e| Error::io(".", e)),
        }
    }

    fn describe_dir(&self) -> String {
        self.working_dir()
            .map_or_else(|_| ".".to_string(), |d| d.display().to_string())
    }

    /// Locate `program` for `check`: as given, then under `basedir`, then on
    /// the search path. The result is absolute.
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        let direct = Path::new(program);
        if is_executable(direct) {
            return std::path::absolute(direct).ok();
        }
        self.resolve_in_basedir(program)
            .or_else(|| which::which(program).ok())
    }

    /// Locate `program` for `apply`, where the child runs inside `basedir`:
    /// a relative path there shadows the same path under the current
    /// directory.
    fn resolve_for_exec(&self, program: &str) -> Option<PathBuf> {
        self.resolve_in_basedir(program).or_else(|| self.resolve(program))
    }

    fn resolve_in_basedir(&self, program: &str) -> Option<PathBuf> {
        let candidate = self.basedir.as_ref()?.join(program);
        if is_executable(&candidate) {
            return std::path::absolute(candidate).ok();
        }
        None
    }

    fn build(&self) -> Result<Command> {
        match &self.command {
            CommandLine::Argv(argv) => {
                let Some((program, args)) = argv.split_first() else {
                    return Err(Error::InvalidCommand("empty argument list".into()));
                };
                let binary = self
                    .resolve_for_exec(program)
                    .unwrap_or_else(|| PathBuf::from(program));
                log::debug!("Resolved `{program}` to {}", binary.display());
                let mut cmd = Command::new(binary);
                cmd.args(args);
                Ok(cmd)
            }
            CommandLine::Shell(expr) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(expr);
                Ok(cmd)
            }
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file())
}

impl Operation for RunCommand {
    fn kind(&self) -> OperationKind {
        OperationKind::RunCommand
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

    fn prepare(&mut self, _ctx: &mut Context) -> Result<()> {
        if !self.stage.is_prepared() {
            self.stage = Stage::Prepared;
        }
        Ok(())
    }

    fn check(&mut self, ctx: &mut Context) -> Result<bool> {
        ensure_prepared(self, ctx, "check")?;
        match &self.command {
            CommandLine::Argv(argv) => Ok(argv
                .first()
                .is_some_and(|program| self.resolve(program).is_some())),
            CommandLine::Shell(_) => Ok(true),
        }
    }

    fn apply(&mut self, ctx: &mut Context) -> Result<()> {
        begin_apply(self, ctx)?;
        let dir = self.working_dir()?;
        let mut cmd = self.build()?;

        let status = cmd
            .current_dir(&dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| Error::CommandSpawn {
                command: self.command.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(Error::CommandFailed {
                command: self.command.to_string(),
                dir,
                status,
            });
        }
        self.stage = Stage::Applied;
        Ok(())
    }

    fn diff(&mut self, ctx: &mut Context) -> Result<String> {
        ensure_prepared(self, ctx, "diff")?;
        Ok(String::new())
    }

    fn log(&self) -> String {
        match &self.command {
            CommandLine::Argv(_) => format!(
                "Executing safe command `{}` in `{}`",
                self.command,
                self.describe_dir()
            ),
            CommandLine::Shell(_) => format!(
                "Executing unsafe shell command `{}` in `{}`",
                self.command,
                self.describe_dir()
            ),
        }
    }
}
