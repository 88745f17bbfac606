//! Strategies for turning a collection's fragments into one text.

use std::fmt;

use crate::context::Collection;
use crate::merge;

/// Why a collection could not be merged.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MergeError(pub String);

impl MergeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Merges the fragments of a named collection.
///
/// Fragments arrive keyed by contributor, in contributor order.
pub trait Merger: fmt::Debug {
    fn merge(&self, name: &str, collection: &Collection) -> Result<String, MergeError>;
}

/// A boxed merger for type-erased storage
pub type BoxedMerger = Box<dyn Merger>;

/// Joins fragments, each newline-terminated, with `separator` between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Concat {
    pub separator: String,
}

impl Concat {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Merger for Concat {
    fn merge(&self, _name: &str, collection: &Collection) -> Result<String, MergeError> {
        let parts: Vec<String> = collection
            .values()
            .map(|fragment| {
                if fragment.ends_with('\n') {
                    fragment.clone()
                } else {
                    format!("{fragment}\n")
                }
            })
            .collect();
        Ok(parts.join(&self.separator))
    }
}

/// Parses every fragment as a TOML table and deep-merges them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TomlMerge;

impl Merger for TomlMerge {
    fn merge(&self, name: &str, collection: &Collection) -> Result<String, MergeError> {
        let mut merged = toml::Table::new();
        for (contributor, fragment) in collection {
            let table: toml::Table = toml::from_str(fragment).map_err(|e| {
                MergeError::new(format!(
                    "fragment from `{contributor}` is not a TOML table: {}",
                    e.message()
                ))
            })?;
            merge::merge_into(&mut merged, table);
        }
        log::debug!(
            "Merged {} TOML fragments of collection `{}`",
            collection.len(),
            name
        );
        toml::to_string_pretty(&merged).map_err(|e| MergeError::new(e.to_string()))
    }
}

/// Any suitable closure is a merger.
pub struct FnMerger<F>(pub F);

impl<F> fmt::Debug for FnMerger<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnMerger")
    }
}

impl<F> Merger for FnMerger<F>
where
    F: Fn(&str, &Collection) -> Result<String, MergeError>,
{
    fn merge(&self, name: &str, collection: &Collection) -> Result<String, MergeError> {
        (self.0)(name, collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(fragments: &[(&str, &str)]) -> Collection {
        fragments
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_concat_in_contributor_order() {
        let c = collection(&[("zsh", "alias ll='ls -l'"), ("base", "export EDITOR=vi\n")]);
        let merged = Concat::default().merge("shellrc", &c).unwrap();
        assert_eq!(merged, "export EDITOR=vi\nalias ll='ls -l'\n");
    }

    #[test]
    fn test_concat_separator() {
        let c = collection(&[("a", "one"), ("b", "two")]);
        let merged = Concat::new("\n").merge("x", &c).unwrap();
        assert_eq!(merged, "one\n\ntwo\n");
    }

    #[test]
    fn test_concat_empty_collection() {
        assert_eq!(Concat::default().merge("x", &Collection::new()).unwrap(), "");
    }

    #[test]
    fn test_toml_merge() {
        let c = collection(&[
            ("base", "[user]\nname = 'me'\n"),
            ("work", "[user]\nemail = 'me@work'\n"),
        ]);
        let merged = TomlMerge.merge("gitconfig", &c).unwrap();
        let parsed: toml::Table = toml::from_str(&merged).unwrap();
        assert_eq!(parsed["user"]["name"].as_str(), Some("me"));
        assert_eq!(parsed["user"]["email"].as_str(), Some("me@work"));
    }

    #[test]
    fn test_toml_merge_names_bad_contributor() {
        let c = collection(&[("broken", "not = = toml")]);
        let err = TomlMerge.merge("gitconfig", &c).unwrap_err();
        assert!(err.to_string().contains("`broken`"));
    }

    #[test]
    fn test_closure_merger() {
        let upper = FnMerger(|_: &str, c: &Collection| {
            Ok(c.values().map(|v| v.to_uppercase()).collect::<String>())
        });
        let c = collection(&[("a", "x"), ("b", "y")]);
        assert_eq!(upper.merge("n", &c).unwrap(), "XY");
    }
}
