//! Alias table resolution
//!
//! Maps known surface spellings of a channel name to one canonical spelling
//! before the normalization fold runs. Matching is prefix-based so suffixes
//! like feed qualifiers don't defeat a hit, longest-alias-first so "RTL 2"
//! never shadows "RTL 2 HD", and boundary-checked so "RTL 2" cannot fire on
//! "RTL 20".

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use super::clean_for_alias;

const BUILTIN_ALIASES: &str = include_str!("../../assets/aliases.toml");

#[derive(Debug, Deserialize)]
struct AliasFile {
    /// canonical spelling -> known surface spellings
    #[serde(default)]
    aliases: BTreeMap<String, Vec<String>>,
}

/// Alias surface form -> canonical spelling lookup.
///
/// Entries are stored pre-cleaned (same fold as the incoming name) and
/// sorted longest-first. Each spaced alias also gets an automatic no-space
/// twin, since playlist authors drop spaces freely.
#[derive(Debug, Clone)]
pub struct AliasTable {
    /// (cleaned alias, canonical) sorted by descending alias length
    entries: Vec<(String, String)>,
}

impl AliasTable {
    /// Table shipped with the crate.
    pub fn builtin() -> Self {
        // The bundled file is validated by tests; a broken edit should not
        // take the whole pipeline down at runtime.
        Self::from_toml(BUILTIN_ALIASES).unwrap_or_else(|e| {
            warn!("builtin alias table failed to parse: {e}");
            Self {
                entries: Vec::new(),
            }
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let file: AliasFile = toml::from_str(text)?;
        let pairs = file.aliases.into_iter().flat_map(|(canonical, variants)| {
            variants
                .into_iter()
                .map(move |alias| (alias, canonical.clone()))
        });
        Ok(Self::from_pairs(pairs))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (alias, canonical) in pairs {
            let canonical = canonical.into();
            let cleaned = clean_for_alias(alias.as_ref());
            if cleaned.is_empty() {
                continue;
            }
            if cleaned.contains(' ') {
                entries.push((cleaned.replace(' ', ""), canonical.clone()));
            }
            entries.push((cleaned, canonical));
        }
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        entries.dedup_by(|a, b| a.0 == b.0);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a raw display name to its canonical spelling, if any alias
    /// matches as a whole-word prefix of the cleaned name.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        let cleaned = clean_for_alias(raw);
        if cleaned.is_empty() {
            return None;
        }
        for (alias, canonical) in &self.entries {
            if let Some(rest) = cleaned.strip_prefix(alias.as_str()) {
                // Accept only at end of name or a word boundary, otherwise
                // "RTL 2" would claim "RTL 20".
                if rest.is_empty() || rest.starts_with(' ') {
                    return Some(canonical);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AliasTable {
        AliasTable::from_pairs([
            ("RTL Kettő", "RTL 2"),
            ("RTL II", "RTL 2"),
            ("RTL 2", "RTL 2"),
            ("M2 Petőfi", "M2"),
        ])
    }

    #[test]
    fn longest_alias_wins() {
        let t = AliasTable::from_pairs([("RTL", "RTL Klub"), ("RTL 2", "RTL 2")]);
        assert_eq!(t.resolve("RTL 2 HD"), Some("RTL 2"));
        assert_eq!(t.resolve("RTL HD"), Some("RTL Klub"));
    }

    #[test]
    fn prefix_needs_word_boundary() {
        let t = table();
        assert_eq!(t.resolve("RTL 2"), Some("RTL 2"));
        assert_eq!(t.resolve("RTL 2 FHD feed"), Some("RTL 2"));
        assert_eq!(t.resolve("RTL 20"), None);
    }

    #[test]
    fn no_space_twin_is_generated() {
        let t = table();
        assert_eq!(t.resolve("RTLII"), Some("RTL 2"));
        assert_eq!(t.resolve("RTLKETTO backup"), Some("RTL 2"));
    }

    #[test]
    fn accents_and_markup_fold_before_matching() {
        let t = table();
        assert_eq!(t.resolve("[COLOR gold]rtl kettő[/COLOR]"), Some("RTL 2"));
        assert_eq!(t.resolve("m2 petofi hd"), Some("M2"));
    }

    #[test]
    fn miss_returns_none() {
        let t = table();
        assert_eq!(t.resolve("Duna World"), None);
        assert_eq!(t.resolve(""), None);
    }

    #[test]
    fn builtin_table_parses_and_is_populated() {
        let t = AliasTable::builtin();
        assert!(!t.is_empty());
        assert_eq!(t.resolve("RTL Kettő"), Some("RTL 2"));
        assert_eq!(t.resolve("Hír TV"), Some("HírTV"));
    }
}
