use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical development identifier. Only [`DevelopmentCatalog`] builds
/// canonical keys from raw upstream spellings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DevelopmentKey(pub String);

impl DevelopmentKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DevelopmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Historical spellings that must resolve to one development.
pub const DEFAULT_DEVELOPMENT_ALIASES: &[(&str, &str)] =
    &[("mérida", "merida"), ("merida yucatan", "merida"), ("mérida yucatán", "merida")];

/// Alias table applied at every repository boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DevelopmentCatalog {
    aliases: BTreeMap<String, String>,
}

impl Default for DevelopmentCatalog {
    fn default() -> Self {
        Self::new(
            DEFAULT_DEVELOPMENT_ALIASES
                .iter()
                .map(|(alias, canonical)| ((*alias).to_string(), (*canonical).to_string())),
        )
    }
}

impl DevelopmentCatalog {
    pub fn new(aliases: impl IntoIterator<Item = (String, String)>) -> Self {
        let aliases = aliases
            .into_iter()
            .map(|(alias, canonical)| (normalize(&alias), normalize(&canonical)))
            .filter(|(alias, canonical)| !alias.is_empty() && alias != canonical)
            .collect();

        Self { aliases }
    }

    /// Default alias set extended (and overridden) by `extra`.
    pub fn with_extra_aliases(extra: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut catalog = Self::default();
        for (alias, canonical) in extra {
            let alias = normalize(&alias);
            let canonical = normalize(&canonical);
            if !alias.is_empty() && alias != canonical {
                catalog.aliases.insert(alias, canonical);
            }
        }
        catalog
    }

    pub fn canonicalize(&self, raw: &str) -> DevelopmentKey {
        let normalized = normalize(raw);
        match self.aliases.get(&normalized) {
            Some(canonical) => DevelopmentKey(canonical.clone()),
            None => DevelopmentKey(normalized),
        }
    }

    pub fn same_development(&self, left: &str, right: &str) -> bool {
        self.canonicalize(left) == self.canonicalize(right)
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(alias, canonical)| (alias.as_str(), canonical.as_str()))
    }
}

fn normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
