//! Unknown-key detection with Levenshtein suggestions.
//!
//! Every config field is `#[serde(default)]`, so a misspelt key silently
//! falls back to its default. Before deserializing, the raw TOML is walked
//! and every dotted key path is compared against the paths of the default
//! config; unknown ones produce warnings with a "did you mean?" hint.
//! Warnings never break a config.

use std::collections::HashSet;

use super::ServiceConfig;

/// A non-fatal config warning.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every dotted key path of [`ServiceConfig`], taken from its serialized
/// defaults so new fields are picked up automatically.
pub fn known_config_keys() -> HashSet<String> {
    toml::Value::try_from(ServiceConfig::default())
        .map(|value| walk_toml_keys(&value, "").into_iter().collect())
        .unwrap_or_default()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// A table `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3; ties go to the
/// lexicographically smaller key so the hint is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.clone())
}

// ============================================================================
// Entry point
// ============================================================================

/// Warnings for every key in `raw_toml` that the config does not know.
///
/// Unparseable input yields no warnings; serde reports the parse error.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    let mut found = walk_toml_keys(&value, "");
    found.sort();

    found
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("snr", "snr"), 0);
        assert_eq!(levenshtein("snr_good", "snr_god"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let value: toml::Value = "[a]\nb = 1\n[a.c]\nd = 2\n".parse().expect("toml");
        let mut keys = walk_toml_keys(&value, "");
        keys.sort();
        assert_eq!(keys, vec!["a", "a.b", "a.c", "a.c.d"]);
    }

    #[test]
    fn test_known_keys_cover_nested_sections() {
        let known = known_config_keys();
        for key in [
            "server.addr",
            "models.bundle_path",
            "correction.rules.snr_excellent",
            "correction.target.confirmed_exoplanet",
            "training.forest.n_trees",
            "properties.semi_major_axis_source",
        ] {
            assert!(known.contains(key), "missing {key}");
        }
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys("[correction]\nblend_wieght = 0.8\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "correction.blend_wieght");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("correction.blend_weight"));
        assert!(warnings[0].to_string().contains("did you mean"));
    }

    #[test]
    fn test_default_config_produces_no_warnings() {
        let text = ServiceConfig::default().to_toml().expect("serialize");
        assert!(validate_unknown_keys(&text).is_empty());
    }

    #[test]
    fn test_garbage_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("zzzzzzzzzzzz = 1\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].suggestion.is_none());
    }
}
