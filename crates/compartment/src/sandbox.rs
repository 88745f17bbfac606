//! VM construction for templates and units.

use mlua::prelude::*;

use crate::bindings::{Binding, Bindings};

/// Upper bound for the heap of a template VM.
const TEMPLATE_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Base-library globals that reach the filesystem, load code or print.
const STRIPPED_GLOBALS: &[&str] = &[
    "collectgarbage",
    "dofile",
    "load",
    "loadfile",
    "print",
    "require",
];

/// Create a fresh VM for one template render.
///
/// Only pure libraries are loaded, loaders are stripped and the globals table
/// is made strict: reading a name that was never assigned raises an error.
pub(crate) fn template_vm(bindings: &Bindings) -> LuaResult<Lua> {
    let libs = LuaStdLib::TABLE | LuaStdLib::STRING | LuaStdLib::MATH | LuaStdLib::UTF8;
    let lua = Lua::new_with(libs, LuaOptions::default())?;
    lua.set_memory_limit(TEMPLATE_MEMORY_LIMIT)?;

    let globals = lua.globals();
    for name in STRIPPED_GLOBALS {
        globals.raw_set(*name, LuaValue::Nil)?;
    }
    let string: LuaTable = globals.raw_get("string")?;
    string.raw_set("dump", LuaValue::Nil)?;

    for (name, binding) in bindings.iter() {
        let value = match binding {
            Binding::Scalar(value) => to_lua(&lua, value)?,
            Binding::Sequence(items) => LuaValue::Table(sequence_to_lua(&lua, items)?),
            Binding::Mapping(table) => LuaValue::Table(table_to_lua(&lua, table)?),
        };
        globals.raw_set(name, value)?;
    }
    globals.raw_set("OUT", "")?;

    let strict = lua.create_table()?;
    strict.set(
        "__index",
        lua.create_function(|_, (_, name): (LuaTable, LuaValue)| {
            let name = match name {
                LuaValue::String(s) => String::from(s.to_string_lossy()),
                other => other.type_name().to_string(),
            };
            Err::<LuaValue, _>(LuaError::runtime(format!(
                "variable '{name}' is not declared"
            )))
        })?,
    )?;
    globals.set_metatable(Some(strict))?;

    Ok(lua)
}

/// Create a VM for a fact unit. Units discover facts, so they get the
/// standard safe libraries including `io` and `os`.
pub(crate) fn unit_vm() -> Lua {
    Lua::new()
}

pub(crate) fn to_lua(lua: &Lua, value: &toml::Value) -> LuaResult<LuaValue> {
    Ok(match value {
        toml::Value::String(s) => LuaValue::String(lua.create_string(s)?),
        toml::Value::Integer(i) => LuaValue::Integer(*i),
        toml::Value::Float(f) => LuaValue::Number(*f),
        toml::Value::Boolean(b) => LuaValue::Boolean(*b),
        toml::Value::Datetime(dt) => LuaValue::String(lua.create_string(dt.to_string())?),
        toml::Value::Array(items) => LuaValue::Table(sequence_to_lua(lua, items)?),
        toml::Value::Table(table) => LuaValue::Table(table_to_lua(lua, table)?),
    })
}

fn sequence_to_lua(lua: &Lua, items: &[toml::Value]) -> LuaResult<LuaTable> {
    let values = items
        .iter()
        .map(|item| to_lua(lua, item))
        .collect::<LuaResult<Vec<_>>>()?;
    lua.create_sequence_from(values)
}

fn table_to_lua(lua: &Lua, table: &toml::Table) -> LuaResult<LuaTable> {
    let out = lua.create_table()?;
    for (key, value) in table {
        out.raw_set(key.as_str(), to_lua(lua, value)?)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm_with(name: &str, binding: Binding) -> Lua {
        let mut bindings = Bindings::new();
        bindings.declare(name, binding).unwrap();
        template_vm(&bindings).unwrap()
    }

    #[test]
    fn test_bindings_are_visible() {
        let mut facts = toml::Table::new();
        facts.insert("hostname".into(), toml::Value::from("box"));
        let lua = vm_with("facts", Binding::Mapping(facts));

        let host: String = lua.load("return facts.hostname").eval().unwrap();
        assert_eq!(host, "box");
    }

    #[test]
    fn test_sequences_are_one_based() {
        let lua = vm_with(
            "packages",
            Binding::Sequence(vec![toml::Value::from("git"), toml::Value::from("zsh")]),
        );

        let first: String = lua.load("return packages[1]").eval().unwrap();
        let len: i64 = lua.load("return #packages").eval().unwrap();
        assert_eq!(first, "git");
        assert_eq!(len, 2);
    }

    #[test]
    fn test_undeclared_global_is_an_error() {
        let lua = template_vm(&Bindings::new()).unwrap();
        let err = lua.load("return missing").eval::<LuaValue>().unwrap_err();
        assert!(err.to_string().contains("'missing' is not declared"));
    }

    #[test]
    fn test_loaders_are_stripped() {
        let lua = template_vm(&Bindings::new()).unwrap();
        assert!(lua.load("return dofile").eval::<LuaValue>().is_err());
        assert!(lua.load("return io").eval::<LuaValue>().is_err());
        assert!(lua.load("return os").eval::<LuaValue>().is_err());

        let dump: LuaValue = lua.load("return string.dump").eval().unwrap();
        assert!(dump.is_nil());
    }

    #[test]
    fn test_assigned_globals_are_readable() {
        let lua = template_vm(&Bindings::new()).unwrap();
        lua.load("greeting = 'hi'").exec().unwrap();
        let greeting: String = lua.load("return greeting").eval().unwrap();
        assert_eq!(greeting, "hi");
    }
}
