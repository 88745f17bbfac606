//! Typed bindings declared into a template render.

use crate::error::RenderError;

/// Lua keywords; none of them can name a global.
const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Globals the compartment owns.
pub(crate) const RESERVED: &[&str] = &[
    "OUT", "_G", "_VERSION", "assert", "error", "getmetatable", "ipairs", "math", "next", "pairs",
    "pcall", "rawequal", "rawget", "rawlen", "rawset", "select", "setmetatable", "string", "table",
    "tonumber", "tostring", "type", "utf8", "xpcall",
];

/// The shape a value is bound with.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A single string, number or boolean.
    Scalar(toml::Value),
    /// An ordered list, exposed as a 1-based Lua sequence.
    Sequence(Vec<toml::Value>),
    /// A keyed table.
    Mapping(toml::Table),
}

impl Binding {
    /// Short name of the shape, for diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Sequence(_) => "sequence",
            Self::Mapping(_) => "mapping",
        }
    }
}

/// The ordered set of globals a render starts with.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<(String, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` as a global of the given shape.
    ///
    /// Redeclaring a name replaces its value. Names must be Lua identifiers
    /// and may not shadow keywords or compartment globals.
    pub fn declare(&mut self, name: &str, binding: Binding) -> Result<(), RenderError> {
        validate_name(name)?;
        log::debug!("declaring {} binding `{}`", binding.shape(), name);

        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = binding;
        } else {
            self.entries.push((name.to_string(), binding));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, binding)| binding)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(n, b)| (n.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_name(name: &str) -> Result<(), RenderError> {
    let reject = |reason: &str| RenderError::Binding {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return Err(reject("not a Lua identifier")),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(reject("not a Lua identifier"));
    }
    if KEYWORDS.contains(&name) {
        return Err(reject("Lua keyword"));
    }
    if RESERVED.contains(&name) {
        return Err(reject("reserved by the compartment"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_replace() {
        let mut bindings = Bindings::new();
        bindings
            .declare("facts", Binding::Mapping(toml::Table::new()))
            .unwrap();
        bindings
            .declare("facts", Binding::Scalar(toml::Value::from(1)))
            .unwrap();

        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings.get("facts").unwrap().shape(), "scalar");
    }

    #[test]
    fn test_declare_keeps_order() {
        let mut bindings = Bindings::new();
        bindings.declare("b", Binding::Sequence(vec![])).unwrap();
        bindings.declare("a", Binding::Sequence(vec![])).unwrap();

        let names: Vec<_> = bindings.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_rejects_invalid_names() {
        let mut bindings = Bindings::new();
        for name in ["", "1abc", "has-dash", "end", "OUT", "string"] {
            let err = bindings
                .declare(name, Binding::Scalar(toml::Value::from(true)))
                .unwrap_err();
            assert!(matches!(err, RenderError::Binding { .. }), "{name}");
        }
        assert!(bindings.is_empty());
    }
}
