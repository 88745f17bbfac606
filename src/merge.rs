//! Deep merge of TOML tables.
//!
//! Tables merge key by key, recursively. Arrays concatenate, base first.
//! Any other pair, including a type mismatch, takes the overlay value.

/// Merge `overlay` over `base`, returning the result.
pub fn merge(base: &toml::Table, overlay: &toml::Table) -> toml::Table {
    let mut merged = base.clone();
    merge_into(&mut merged, overlay.clone());
    merged
}

/// Merge `overlay` into `base` in place.
pub fn merge_into(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => merge_value(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

fn merge_value(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(b), toml::Value::Table(o)) => merge_into(b, o),
        (toml::Value::Array(b), toml::Value::Array(o)) => b.extend(o),
        (slot, o) => *slot = o,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(s: &str) -> toml::Table {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_tables_merge_recursively() {
        let merged = merge(
            &table("[os]\nname = 'linux'\n[os.kernel]\nmajor = 6\n"),
            &table("[os]\narch = 'x86_64'\n[os.kernel]\nminor = 1\n"),
        );
        assert_eq!(merged["os"]["name"].as_str(), Some("linux"));
        assert_eq!(merged["os"]["arch"].as_str(), Some("x86_64"));
        assert_eq!(merged["os"]["kernel"]["major"].as_integer(), Some(6));
        assert_eq!(merged["os"]["kernel"]["minor"].as_integer(), Some(1));
    }

    #[test]
    fn test_arrays_concatenate() {
        let merged = merge(&table("shells = ['zsh']"), &table("shells = ['fish', 'zsh']"));
        let shells: Vec<_> = merged["shells"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert_eq!(shells, vec!["zsh", "fish", "zsh"]);
    }

    #[test]
    fn test_overlay_wins_on_conflict() {
        let merged = merge(&table("a = 1\nb = 'x'"), &table("a = 2\nb = { nested = true }"));
        assert_eq!(merged["a"].as_integer(), Some(2));
        assert!(merged["b"].is_table());
    }

    #[test]
    fn test_base_is_untouched() {
        let base = table("a = 1");
        let _ = merge(&base, &table("a = 2"));
        assert_eq!(base["a"].as_integer(), Some(1));
    }
}
