//! Fact units: Lua files that report discovered facts.
//!
//! A unit returns either a function, which is called with no arguments, or
//! a table. The resulting table becomes a TOML table:
//!
//! ```lua
//! return function()
//!   local f = io.popen("uname -r")
//!   local kernel = f:read("*l")
//!   f:close()
//!   return { kernel = kernel }
//! end
//! ```

use std::fs;
use std::path::Path;

use mlua::prelude::*;

use crate::error::UnitError;
use crate::sandbox;

/// Evaluate the unit at `path` and return the facts it discovered.
pub fn load_unit(path: &Path) -> Result<toml::Table, UnitError> {
    let content = fs::read_to_string(path).map_err(|source| UnitError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let lua = sandbox::unit_vm();
    let chunk = lua
        .load(&content)
        .set_name(format!("@{}", path.display()))
        .into_function()
        .map_err(|e| UnitError::Load(e.to_string()))?;

    let value = chunk
        .call::<LuaValue>(())
        .map_err(|e| UnitError::Run(e.to_string()))?;

    let value = match value {
        LuaValue::Function(f) => f
            .call::<LuaValue>(())
            .map_err(|e| UnitError::Run(e.to_string()))?,
        other => other,
    };

    let facts = match value {
        LuaValue::Table(t) => t,
        other => return Err(UnitError::NotAMapping(other.type_name())),
    };

    let table = lua
        .from_value::<toml::Table>(LuaValue::Table(facts))
        .map_err(|e| UnitError::Convert(e.to_string()))?;

    log::debug!("unit {} reported {} facts", path.display(), table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn unit(source: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".lua").tempfile().unwrap();
        file.write_all(source.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_function_unit() {
        let file = unit("return function() return { os = 'linux', cores = 4 } end");
        let facts = load_unit(file.path()).unwrap();

        assert_eq!(facts["os"].as_str(), Some("linux"));
        assert_eq!(facts["cores"].as_integer(), Some(4));
    }

    #[test]
    fn test_table_unit() {
        let file = unit("return { nested = { enabled = true }, list = { 'a', 'b' } }");
        let facts = load_unit(file.path()).unwrap();

        assert_eq!(facts["nested"]["enabled"].as_bool(), Some(true));
        let list = facts["list"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].as_str(), Some("a"));
    }

    #[test]
    fn test_unit_has_os_library() {
        let file = unit("return function() return { path_set = os.getenv('PATH') ~= nil } end");
        let facts = load_unit(file.path()).unwrap();
        assert_eq!(facts["path_set"].as_bool(), Some(true));
    }

    #[test]
    fn test_unit_must_return_table() {
        let file = unit("return 42");
        let err = load_unit(file.path()).unwrap_err();
        assert!(matches!(err, UnitError::NotAMapping("integer")));
    }

    #[test]
    fn test_unit_syntax_error() {
        let file = unit("return function(");
        assert!(matches!(load_unit(file.path()), Err(UnitError::Load(_))));
    }

    #[test]
    fn test_unit_runtime_error() {
        let file = unit("return function() error('no facts today') end");
        let err = load_unit(file.path()).unwrap_err();
        assert!(matches!(err, UnitError::Run(_)));
        assert!(err.to_string().contains("no facts today"));
    }

    #[test]
    fn test_missing_unit() {
        let err = load_unit(Path::new("/nonexistent/unit.lua")).unwrap_err();
        assert!(matches!(err, UnitError::Io { .. }));
    }
}
