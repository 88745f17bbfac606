//! Test helpers shared across modules.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::backend::{Backend, Payload};
use crate::context::Context;
use crate::sink::{DiffHeader, Sink, SinkError, unified_diff};

/// A sink that records what it receives instead of persisting it.
#[derive(Debug, Clone)]
pub struct MemorySink {
    name: String,
    path: PathBuf,
    requires: Vec<Backend>,
    current: String,
    check_result: bool,
    fail_emit: bool,
    emitted: Rc<RefCell<Vec<Payload>>>,
}

impl MemorySink {
    /// A text-only sink that accepts everything.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::from("/memory").join(name),
            requires: vec![Backend::Text],
            current: String::new(),
            check_result: true,
            fail_emit: false,
            emitted: Rc::default(),
        }
    }

    pub fn requiring(mut self, backends: &[Backend]) -> Self {
        self.requires = backends.to_vec();
        self
    }

    /// Content the destination holds before anything is emitted.
    pub fn with_current(mut self, current: &str) -> Self {
        self.current = current.to_string();
        self
    }

    pub fn failing_checks(mut self) -> Self {
        self.check_result = false;
        self
    }

    pub fn failing_emits(mut self) -> Self {
        self.fail_emit = true;
        self
    }

    /// Handle on the recorded payloads, still valid after the sink is boxed.
    pub fn emitted(&self) -> Rc<RefCell<Vec<Payload>>> {
        Rc::clone(&self.emitted)
    }

    pub fn boxed(self) -> Box<dyn Sink> {
        Box::new(self)
    }
}

impl fmt::Display for MemorySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory:{}", self.name)
    }
}

impl Sink for MemorySink {
    fn requires(&self) -> &[Backend] {
        &self.requires
    }

    fn emit(&mut self, payload: &Payload, _ctx: &Context) -> Result<(), SinkError> {
        if self.fail_emit {
            return Err("destination is read-only".into());
        }
        self.emitted.borrow_mut().push(payload.clone());
        Ok(())
    }

    fn check(&self, _payload: &Payload, _ctx: &Context) -> bool {
        self.check_result
    }

    fn diff(
        &self,
        payload: &Payload,
        _ctx: &Context,
        header: &DiffHeader,
    ) -> Result<String, SinkError> {
        let new = match payload {
            Payload::Text(text) => text.clone(),
            Payload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Payload::Path(path) => fs::read_to_string(path)?,
        };
        Ok(unified_diff(
            &new,
            header,
            &self.current,
            &self.path.display().to_string(),
        ))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `content` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Write an executable script to `dir/name` and return the path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = write_file(dir, name, &format!("#!/bin/sh\n{body}\n"));
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
