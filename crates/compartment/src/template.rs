//! Template parsing and sandboxed rendering.

use std::fs;
use std::path::Path;

use mlua::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bindings::Bindings;
use crate::error::{Location, RenderError};
use crate::sandbox;

/// Custom fragment delimiters, e.g. `[%` and `%]`.
///
/// Custom delimiters do not nest and have no escape sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Delimiters {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Fragment { line: usize, code: String },
}

/// A parsed template, ready to be rendered any number of times.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Read and parse a template file.
    pub fn from_file(path: &Path, delimiters: Option<&Delimiters>) -> Result<Self, RenderError> {
        let text = fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path.display().to_string(), &text, delimiters)
    }

    /// Parse template text. `name` appears in Lua error messages.
    pub fn parse(
        name: impl Into<String>,
        text: &str,
        delimiters: Option<&Delimiters>,
    ) -> Result<Self, RenderError> {
        let segments = match delimiters {
            None => split_braces(text)?,
            Some(d) => split_custom(text, d)?,
        };
        Ok(Self {
            name: name.into(),
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of Lua fragments in the template.
    pub fn fragment_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Fragment { .. }))
            .count()
    }

    /// Render against `bindings` in a fresh sandbox.
    ///
    /// `preamble` runs once before the first fragment; globals it assigns are
    /// visible to every fragment.
    pub fn render(
        &self,
        bindings: &Bindings,
        preamble: Option<&str>,
    ) -> Result<String, RenderError> {
        let lua = sandbox::template_vm(bindings)?;

        if let Some(code) = preamble {
            let chunk = lua
                .load(code)
                .set_name(format!("={}:preamble", self.name))
                .into_function()
                .map_err(|e| classify(Location::Preamble, e))?;
            chunk
                .call::<()>(())
                .map_err(|e| classify(Location::Preamble, e))?;
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Fragment { line, code } => {
                    out.push_str(&self.run_fragment(&lua, *line, code)?);
                }
            }
        }

        log::debug!(
            "rendered {} ({} fragments, {} bytes)",
            self.name,
            self.fragment_count(),
            out.len()
        );
        Ok(out)
    }

    fn run_fragment(&self, lua: &Lua, line: usize, code: &str) -> Result<String, RenderError> {
        let at = Location::Line(line);
        let chunk_name = format!("={}:{}", self.name, line);

        // Expressions first, so `{ facts.hostname }` substitutes its value.
        let chunk = match lua
            .load(format!("return {code}"))
            .set_name(chunk_name.clone())
            .into_function()
        {
            Ok(f) => f,
            Err(_) => lua
                .load(code)
                .set_name(chunk_name)
                .into_function()
                .map_err(|e| classify(at, e))?,
        };

        let globals = lua.globals();
        globals.raw_set("OUT", "")?;

        let results = chunk.call::<LuaMultiValue>(()).map_err(|e| classify(at, e))?;

        match globals.raw_get::<LuaValue>("OUT")? {
            LuaValue::String(s) if !s.as_bytes().is_empty() => {
                return Ok(String::from(s.to_string_lossy()));
            }
            _ => {}
        }

        let value = results.into_iter().next().unwrap_or(LuaValue::Nil);
        text_of(value, at)
    }
}

fn classify(at: Location, err: LuaError) -> RenderError {
    match err {
        LuaError::SyntaxError { message, .. } => RenderError::Syntax { at, message },
        other => RenderError::Runtime {
            at,
            message: other.to_string(),
        },
    }
}

fn text_of(value: LuaValue, at: Location) -> Result<String, RenderError> {
    match value {
        LuaValue::Nil => Ok(String::new()),
        LuaValue::String(s) => Ok(String::from(s.to_string_lossy())),
        LuaValue::Integer(i) => Ok(i.to_string()),
        LuaValue::Number(n) => Ok(format_number(n)),
        LuaValue::Boolean(b) => Ok(b.to_string()),
        other => Err(RenderError::Substitution {
            at,
            type_name: other.type_name(),
        }),
    }
}

/// Format a float the way Lua's `tostring` does for common values.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.1}")
    } else {
        n.to_string()
    }
}

/// Split text on balanced `{ }` fragments. `\{` and `\}` outside a fragment
/// produce literal braces.
fn split_braces(text: &str) -> Result<Vec<Segment>, RenderError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some(&('{' | '}'))) => {
                if let Some(brace) = chars.next() {
                    literal.push(brace);
                }
            }
            '{' => {
                let start = line;
                let mut depth = 1;
                let mut code = String::new();
                loop {
                    let Some(c) = chars.next() else {
                        return Err(RenderError::Syntax {
                            at: Location::Line(start),
                            message: "unterminated fragment, missing `}`".to_string(),
                        });
                    };
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        '\n' => line += 1,
                        _ => {}
                    }
                    code.push(c);
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Fragment { line: start, code });
            }
            '\n' => {
                line += 1;
                literal.push(c);
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn split_custom(text: &str, delimiters: &Delimiters) -> Result<Vec<Segment>, RenderError> {
    if delimiters.open.is_empty() || delimiters.close.is_empty() {
        return Err(RenderError::Syntax {
            at: Location::Line(1),
            message: "delimiters must not be empty".to_string(),
        });
    }

    let mut segments = Vec::new();
    let mut rest = text;
    let mut line = 1;

    while let Some(open_at) = rest.find(&delimiters.open) {
        let (literal, after_literal) = rest.split_at(open_at);
        line += literal.matches('\n').count();
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal.to_string()));
        }

        let body = &after_literal[delimiters.open.len()..];
        let Some(close_at) = body.find(&delimiters.close) else {
            return Err(RenderError::Syntax {
                at: Location::Line(line),
                message: format!("unterminated fragment, missing `{}`", delimiters.close),
            });
        };
        let code = &body[..close_at];
        segments.push(Segment::Fragment {
            line,
            code: code.to_string(),
        });
        line += code.matches('\n').count();
        rest = &body[close_at + delimiters.close.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Binding;
    use std::io::Write;

    fn facts_bindings() -> Bindings {
        let mut facts = toml::Table::new();
        facts.insert("hostname".into(), toml::Value::from("box"));
        facts.insert("cores".into(), toml::Value::from(8));

        let mut bindings = Bindings::new();
        bindings.declare("facts", Binding::Mapping(facts)).unwrap();
        bindings
            .declare(
                "packages",
                Binding::Sequence(vec![toml::Value::from("git"), toml::Value::from("zsh")]),
            )
            .unwrap();
        bindings
    }

    fn render(text: &str) -> Result<String, RenderError> {
        Template::parse("test.tmpl", text, None)?.render(&facts_bindings(), None)
    }

    #[test]
    fn test_literal_only() {
        assert_eq!(render("plain text\n").unwrap(), "plain text\n");
    }

    #[test]
    fn test_expression_fragment() {
        assert_eq!(
            render("host={ facts.hostname } cores={facts.cores}").unwrap(),
            "host=box cores=8"
        );
    }

    #[test]
    fn test_missing_fact_renders_empty() {
        assert_eq!(render("[{ facts.nonexistent }]").unwrap(), "[]");
    }

    #[test]
    fn test_out_accumulator() {
        let text = "{ for _, p in ipairs(packages) do OUT = OUT .. p .. ';' end }";
        assert_eq!(render(text).unwrap(), "git;zsh;");
    }

    #[test]
    fn test_nested_braces_in_fragment() {
        assert_eq!(render("{ #{1, 2, 3} }").unwrap(), "3");
    }

    #[test]
    fn test_escaped_braces() {
        assert_eq!(render(r"\{literal\}").unwrap(), "{literal}");
    }

    #[test]
    fn test_statement_fragment_without_output() {
        assert_eq!(render("{ x = 1 }{ x + 1 }").unwrap(), "2");
    }

    #[test]
    fn test_float_and_bool_output() {
        assert_eq!(render("{ 1.0 } { 2.5 } { 1 < 2 }").unwrap(), "1.0 2.5 true");
    }

    #[test]
    fn test_unterminated_fragment() {
        let err = render("line one\n{ facts.hostname").unwrap_err();
        assert!(matches!(
            err,
            RenderError::Syntax {
                at: Location::Line(2),
                ..
            }
        ));
    }

    #[test]
    fn test_lua_syntax_error_reports_line() {
        let err = render("a\nb\n{ if then }").unwrap_err();
        assert!(matches!(err, RenderError::Syntax { .. }));
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_runtime_error() {
        let err = render("{ facts.hostname.nope.deeper }").unwrap_err();
        assert!(matches!(err, RenderError::Runtime { .. }));
    }

    #[test]
    fn test_undeclared_variable_is_runtime_error() {
        let err = render("{ automatic.os }").unwrap_err();
        assert!(err.to_string().contains("'automatic' is not declared"));
    }

    #[test]
    fn test_table_substitution_is_broken() {
        let err = render("{ packages }").unwrap_err();
        assert!(matches!(
            err,
            RenderError::Substitution {
                type_name: "table",
                ..
            }
        ));
    }

    #[test]
    fn test_custom_delimiters() {
        let delims = Delimiters::new("[%", "%]");
        let template =
            Template::parse("t", "json = {\"host\": \"[% facts.hostname %]\"}", Some(&delims))
                .unwrap();
        assert_eq!(
            template.render(&facts_bindings(), None).unwrap(),
            "json = {\"host\": \"box\"}"
        );
    }

    #[test]
    fn test_custom_delimiters_unterminated() {
        let delims = Delimiters::new("<<", ">>");
        let err = Template::parse("t", "x\n<< 1 + 1", Some(&delims)).unwrap_err();
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn test_empty_delimiters_rejected() {
        let delims = Delimiters::new("", "}}");
        assert!(Template::parse("t", "x", Some(&delims)).is_err());
    }

    #[test]
    fn test_preamble_defines_helpers() {
        let template = Template::parse("t", "{ shout(facts.hostname) }", None).unwrap();
        let out = template
            .render(
                &facts_bindings(),
                Some("function shout(s) return string.upper(s) end"),
            )
            .unwrap();
        assert_eq!(out, "BOX");
    }

    #[test]
    fn test_preamble_error() {
        let template = Template::parse("t", "x", None).unwrap();
        let err = template
            .render(&facts_bindings(), Some("error('nope')"))
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Runtime {
                at: Location::Preamble,
                ..
            }
        ));
    }

    #[test]
    fn test_renders_are_isolated() {
        let text = "{ counter = (rawget(_G, 'counter') or 0) + 1 }{ counter }";
        let template = Template::parse("t", text, None).unwrap();
        let bindings = facts_bindings();
        assert_eq!(template.render(&bindings, None).unwrap(), "1");
        assert_eq!(template.render(&bindings, None).unwrap(), "1");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "hello {{ facts.hostname }}").unwrap();

        let template = Template::from_file(file.path(), None).unwrap();
        assert_eq!(template.fragment_count(), 1);
        assert_eq!(template.render(&facts_bindings(), None).unwrap(), "hello box");
    }

    #[test]
    fn test_from_missing_file() {
        let err = Template::from_file(Path::new("/nonexistent/template"), None).unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }));
    }
}
