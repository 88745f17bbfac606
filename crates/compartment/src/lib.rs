//! # compartment
//!
//! A sandboxed Lua compartment for configuration templates and fact units.
//!
//! ## Templates
//!
//! A template is literal text with embedded Lua fragments:
//!
//! ```text
//! host = "{ facts.hostname }"
//! { for _, p in ipairs(packages) do OUT = OUT .. "pkg " .. p .. "\n" end }
//! ```
//!
//! Each render runs in a fresh VM that only carries the `table`, `string`,
//! `math` and `utf8` libraries. Data reaches the template exclusively
//! through declared [`Bindings`]; reading any other global is an error.
//!
//! ```no_run
//! use compartment::{Binding, Bindings, Template};
//!
//! let mut bindings = Bindings::new();
//! bindings.declare("name", Binding::Scalar(toml::Value::from("world")))?;
//!
//! let template = Template::parse("greeting", "hello { name }", None)?;
//! assert_eq!(template.render(&bindings, None)?, "hello world");
//! # Ok::<(), compartment::RenderError>(())
//! ```
//!
//! ## Units
//!
//! [`load_unit`] evaluates a Lua file that returns a function (or a table)
//! describing discovered facts, and converts the result into a TOML table.

pub mod bindings;
pub mod error;
mod sandbox;
pub mod template;
pub mod unit;

pub use bindings::{Binding, Bindings};
pub use error::{Location, RenderError, UnitError};
pub use template::{Delimiters, Template};
pub use unit::load_unit;
