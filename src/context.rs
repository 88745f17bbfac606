//! Run-scoped execution context
//!
//! One `Context` is threaded by `&mut` through every operation of a run, in
//! order. Facts, packages and collections are fixed when the context is
//! built. Automatic facts grow as factors run, and only through
//! [`Context::merge_automatic`].

use anyhow::{Context as AnyhowContext, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::merge;
use crate::paths;

/// Fragments of one collection, keyed by contributor.
///
/// Contributors are sorted, so the fragments are always visited in the same
/// order even though their declaration order carries no meaning.
pub type Collection = BTreeMap<String, String>;

/// Shared state for one run.
#[derive(Debug, Clone, Default)]
pub struct Context {
    facts: toml::Table,
    packages: Vec<String>,
    automatic: toml::Table,
    collections: BTreeMap<String, Collection>,
}

/// On-disk form of a context file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ContextFile {
    #[serde(default)]
    facts: toml::Table,
    #[serde(default)]
    packages: Vec<String>,
    #[serde(default)]
    automatic: toml::Table,
    #[serde(default)]
    collections: BTreeMap<String, Collection>,
}

impl Context {
    /// Create a context from resolved configuration.
    pub fn new(
        facts: toml::Table,
        packages: Vec<String>,
        collections: BTreeMap<String, Collection>,
    ) -> Self {
        Self {
            facts,
            packages,
            automatic: toml::Table::new(),
            collections,
        }
    }

    /// Parse a context from TOML text:
    ///
    /// ```toml
    /// packages = ["base", "zsh"]
    ///
    /// [facts]
    /// hostname = "box"
    ///
    /// [collections.gitconfig]
    /// base = "[user]\nname = \"me\"\n"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ContextFile = toml::from_str(content).context("Invalid context format")?;
        Ok(Self {
            facts: file.facts,
            packages: file.packages,
            automatic: file.automatic,
            collections: file.collections,
        })
    }

    /// Load a context file. `~` and environment variables in the path are
    /// expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = paths::expand(&path.as_ref().to_string_lossy());
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read context file: {}", path.display()))?;

        let ctx = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse context file: {}", path.display()))?;

        log::debug!(
            "Loaded context from {} ({} facts, {} packages, {} collections)",
            path.display(),
            ctx.facts.len(),
            ctx.packages.len(),
            ctx.collections.len()
        );
        Ok(ctx)
    }

    /// Load the context file named by `PROVISION_CONTEXT`, or the default
    /// location under the config directory.
    pub fn load_default() -> Result<Self> {
        Self::load(paths::context_file()?)
    }

    pub fn facts(&self) -> &toml::Table {
        &self.facts
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn automatic(&self) -> &toml::Table {
        &self.automatic
    }

    pub fn collections(&self) -> &BTreeMap<String, Collection> {
        &self.collections
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Deep-merge newly discovered facts into the automatic facts.
    ///
    /// This is the only way the context changes during a run.
    pub fn merge_automatic(&mut self, discovered: toml::Table) {
        log::debug!("Merging {} discovered facts", discovered.len());
        merge::merge_into(&mut self.automatic, discovered);
    }

    /// The data bundle templates are rendered against.
    pub fn template_data(&self) -> toml::Table {
        let mut data = toml::Table::new();
        data.insert("facts".into(), toml::Value::Table(self.facts.clone()));
        data.insert(
            "packages".into(),
            toml::Value::Array(
                self.packages
                    .iter()
                    .map(|p| toml::Value::String(p.clone()))
                    .collect(),
            ),
        );
        data.insert(
            "automatic".into(),
            toml::Value::Table(self.automatic.clone()),
        );
        data
    }
}
