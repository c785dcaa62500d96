//! `key=value` filters restricting which entries take part in a match

use std::fmt;

use crate::catalog::KeywordEntry;

/// Entry attribute a filter compares against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKey {
    Category,
    Locale,
    /// Any key of [`KeywordEntry::attributes`], lower-cased
    Attribute(String),
}

/// Parsed equality constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    key: FilterKey,
    value: String,
}

impl Filter {
    /// Parse the `key=value` syntax
    ///
    /// Returns `None` (no filter) for an empty string, a string without `=`,
    /// or an empty key.
    pub fn parse(raw: &str) -> Option<Self> {
        let (key, value) = raw.split_once('=')?;
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }

        let key = match key.as_str() {
            "category" => FilterKey::Category,
            "locale" => FilterKey::Locale,
            _ => FilterKey::Attribute(key),
        };

        Some(Self {
            key,
            value: value.trim().to_string(),
        })
    }

    pub fn category(value: impl Into<String>) -> Self {
        Self {
            key: FilterKey::Category,
            value: value.into(),
        }
    }

    pub fn key(&self) -> &FilterKey {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether an entry participates under this filter
    pub fn accepts(&self, entry: &KeywordEntry) -> bool {
        match &self.key {
            FilterKey::Category => entry.category == self.value,
            FilterKey::Locale => entry.locale.as_deref() == Some(self.value.as_str()),
            FilterKey::Attribute(name) => entry
                .attributes
                .iter()
                .any(|(k, v)| k.to_lowercase() == *name && *v == self.value),
        }
    }

    /// Give `entry` the attribute this filter selects on
    ///
    /// Entries of a catalog the service already filtered carry no metadata
    /// of their own; tagging them keeps [`Filter::accepts`] true for them.
    pub fn tag(&self, entry: &mut KeywordEntry) {
        match &self.key {
            FilterKey::Category => entry.category = self.value.clone(),
            FilterKey::Locale => entry.locale = Some(self.value.clone()),
            FilterKey::Attribute(name) => {
                entry.attributes.insert(name.clone(), self.value.clone());
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match &self.key {
            FilterKey::Category => "category",
            FilterKey::Locale => "locale",
            FilterKey::Attribute(name) => name.as_str(),
        };
        write!(f, "{}={}", key, self.value)
    }
}
