//! Keyword dataset parsing and representation
//!
//! The catalog service answers with a JSON document listing every keyword
//! of one dataset version:
//!
//! ```json
//! {
//!   "version": "20220206",
//!   "preprocess": "[^a-z0-9]",
//!   "keywords": [
//!     {"keyword": "sewerslide", "category": "self-harm", "locale": "en"}
//!   ]
//! }
//! ```
//!
//! The hosted service still answers with the older regex shape, where the
//! keywords are regular expressions and any filter was applied server-side:
//!
//! ```json
//! {
//!   "version": "20220206",
//!   "regex": {"keywords": ["sewer.?slide"], "preprocess": "\\s"}
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::KeywordsError;
use crate::filter::Filter;
use crate::index::Normalizer;

/// One matchable keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordEntry {
    /// Phrase or term as published by the catalog
    #[serde(alias = "phrase")]
    pub keyword: String,

    /// Category label (e.g. "self-harm", "wellness")
    pub category: String,

    /// Optional locale tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Free-form attribute tags usable in filters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl KeywordEntry {
    pub fn new(keyword: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            category: category.into(),
            locale: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// How the `keyword` of each entry is matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Normalized phrase containment
    #[default]
    Phrase,
    /// Regular expression over the stripped text
    Regex,
}

impl MatchMode {
    fn is_phrase(&self) -> bool {
        *self == MatchMode::Phrase
    }
}

/// One versioned snapshot of the keyword catalog
///
/// Two datasets with the same version have the same contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Opaque version identifier (e.g. "20220206")
    pub version: String,

    /// When this dataset was fetched from the catalog service
    pub fetched_at: DateTime<Utc>,

    /// Normalization applied to keywords and query text
    #[serde(default)]
    pub preprocess: Normalizer,

    /// Entries in catalog order
    pub entries: Vec<KeywordEntry>,

    #[serde(default, skip_serializing_if = "MatchMode::is_phrase")]
    pub mode: MatchMode,

    /// Filter the service applied before answering (regex catalogs only)
    ///
    /// Such a dataset holds only that filter's entries and answers no other
    /// filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_filter: Option<String>,
}

/// Catalog service response body, in either shape
#[derive(Debug, Deserialize)]
struct CatalogResponse {
    version: String,
    #[serde(default)]
    preprocess: Normalizer,
    #[serde(default)]
    keywords: Option<Vec<KeywordEntry>>,
    #[serde(default)]
    regex: Option<RegexCatalog>,
}

#[derive(Debug, Deserialize)]
struct RegexCatalog {
    keywords: Vec<String>,
    #[serde(default)]
    preprocess: Option<String>,
}

impl Dataset {
    /// Dataset with the default normalizer, fetched now
    pub fn new(version: impl Into<String>, entries: Vec<KeywordEntry>) -> Self {
        Self {
            version: version.into(),
            fetched_at: Utc::now(),
            preprocess: Normalizer::default(),
            entries,
            mode: MatchMode::Phrase,
            server_filter: None,
        }
    }

    /// Regex dataset; `server_filter` is the filter the service applied
    pub fn from_expressions(
        version: impl Into<String>,
        expressions: Vec<String>,
        server_filter: Option<&Filter>,
    ) -> Self {
        let entries = expressions
            .into_iter()
            .map(|expression| {
                let mut entry = KeywordEntry::new(expression, "");
                if let Some(filter) = server_filter {
                    filter.tag(&mut entry);
                }
                entry
            })
            .collect();

        Self {
            version: version.into(),
            fetched_at: Utc::now(),
            preprocess: Normalizer::default(),
            entries,
            mode: MatchMode::Regex,
            server_filter: server_filter.map(ToString::to_string),
        }
    }

    /// Whether this dataset can answer a lookup under `filter`
    ///
    /// Phrase catalogs are complete and filtered locally. Regex catalogs
    /// only answer the filter the service applied.
    pub fn answers(&self, filter: Option<&Filter>) -> bool {
        match self.mode {
            MatchMode::Phrase => true,
            MatchMode::Regex => {
                self.server_filter.as_deref() == filter.map(ToString::to_string).as_deref()
            }
        }
    }

    pub fn with_preprocess(mut self, preprocess: Normalizer) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// Parse a catalog service response body
    ///
    /// `filter` is the filter sent with the request; it scopes a regex
    /// catalog and is ignored for a phrase catalog. Fails as a whole; a
    /// partially valid body never yields a dataset.
    pub fn from_catalog_json(
        body: &[u8],
        fetched_at: DateTime<Utc>,
        filter: Option<&Filter>,
    ) -> Result<Self, KeywordsError> {
        let response: CatalogResponse = serde_json::from_slice(body)
            .map_err(|e| KeywordsError::parse("malformed catalog body", e))?;

        let version = response.version.trim();
        if version.is_empty() {
            return Err(KeywordsError::parse_msg("catalog version is empty"));
        }

        match (response.keywords, response.regex) {
            (Some(keywords), _) => {
                for (position, entry) in keywords.iter().enumerate() {
                    if entry.keyword.trim().is_empty() {
                        return Err(KeywordsError::parse_msg(format!(
                            "keyword #{position} has an empty phrase"
                        )));
                    }
                }

                Ok(Self {
                    version: version.to_string(),
                    fetched_at,
                    preprocess: response.preprocess,
                    entries: keywords,
                    mode: MatchMode::Phrase,
                    server_filter: None,
                })
            }
            (None, Some(expressions)) => {
                regex::RegexSet::new(&expressions.keywords)
                    .map_err(|e| KeywordsError::parse("invalid keyword expression", e))?;

                let pattern = expressions.preprocess.as_deref().filter(|p| !p.is_empty());
                let preprocess = match pattern {
                    Some(pattern) => Normalizer::with_pattern(pattern)
                        .map_err(|e| KeywordsError::parse("invalid preprocess pattern", e))?,
                    None => Normalizer::default(),
                };

                let mut dataset = Self::from_expressions(version, expressions.keywords, filter);
                dataset.fetched_at = fetched_at;
                dataset.preprocess = preprocess;
                Ok(dataset)
            }
            (None, None) => Err(KeywordsError::parse_msg(
                "catalog body has neither keywords nor regex",
            )),
        }
    }

    /// Age relative to `now`, zero if the clock went backwards
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.fetched_at).to_std().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BODY: &str = r#"{
        "version": "20220206",
        "keywords": [
            {"keyword": "sewerslide", "category": "self-harm", "locale": "en"},
            {"phrase": "breathing exercise", "category": "wellness",
             "attributes": {"severity": "low"}}
        ]
    }"#;

    #[test]
    fn test_parse_catalog_body() {
        let now = Utc::now();
        let dataset = Dataset::from_catalog_json(BODY.as_bytes(), now, None).unwrap();

        assert_eq!(dataset.version, "20220206");
        assert_eq!(dataset.fetched_at, now);
        assert_eq!(dataset.preprocess, Normalizer::default());
        assert_eq!(
            dataset.entries,
            vec![
                KeywordEntry::new("sewerslide", "self-harm").with_locale("en"),
                KeywordEntry::new("breathing exercise", "wellness")
                    .with_attribute("severity", "low"),
            ]
        );
    }

    #[test]
    fn test_parse_custom_preprocess() {
        let body = r#"{"version": "1", "preprocess": "\\s+", "keywords": []}"#;
        let dataset = Dataset::from_catalog_json(body.as_bytes(), Utc::now(), None).unwrap();
        assert_eq!(dataset.preprocess.pattern(), Some(r"\s+"));
    }

    #[test]
    fn test_missing_fields_fail() {
        for body in [
            r#"{"keywords": []}"#,
            r#"{"version": "1"}"#,
            r#"{"version": "1", "keywords": [{"keyword": "x"}]}"#,
            r#"{"version": "  ", "keywords": []}"#,
            r#"{"version": "1", "keywords": [{"keyword": " ", "category": "a"}]}"#,
            "<html>maintenance</html>",
        ] {
            let err = Dataset::from_catalog_json(body.as_bytes(), Utc::now(), None).unwrap_err();
            assert!(
                matches!(err, KeywordsError::ResponseParse { .. }),
                "{body} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_regex_shape() {
        let body = r#"{"version": "20220206", "regex": {"keywords": ["sewer.?slide", "^kms$"], "preprocess": "\\s"}}"#;
        let wellness = Filter::category("wellness");
        let dataset =
            Dataset::from_catalog_json(body.as_bytes(), Utc::now(), Some(&wellness)).unwrap();

        assert_eq!(dataset.mode, MatchMode::Regex);
        assert_eq!(dataset.preprocess.pattern(), Some(r"\s"));
        assert_eq!(dataset.server_filter.as_deref(), Some("category=wellness"));
        assert_eq!(
            dataset.entries,
            vec![
                KeywordEntry::new("sewer.?slide", "wellness"),
                KeywordEntry::new("^kms$", "wellness"),
            ]
        );
    }

    #[test]
    fn test_regex_catalog_answers_only_its_filter() {
        let unfiltered = Dataset::from_expressions("1", vec!["kms".into()], None);
        assert!(unfiltered.answers(None));
        assert!(!unfiltered.answers(Some(&Filter::category("wellness"))));

        let wellness = Filter::category("wellness");
        let filtered = Dataset::from_expressions("1", vec!["kms".into()], Some(&wellness));
        assert!(filtered.answers(Some(&wellness)));
        assert!(!filtered.answers(None));

        let phrases = Dataset::new("1", vec![]);
        assert!(phrases.answers(None));
        assert!(phrases.answers(Some(&wellness)));
    }

    #[test]
    fn test_invalid_regex_shape_fails() {
        for body in [
            r#"{"version": "1", "regex": {"keywords": ["sewer(slide"]}}"#,
            r#"{"version": "1", "regex": {"keywords": ["kms"], "preprocess": "(["}}"#,
            r#"{"version": "1", "regex": {"preprocess": "\\s"}}"#,
        ] {
            let err = Dataset::from_catalog_json(body.as_bytes(), Utc::now(), None).unwrap_err();
            assert!(
                matches!(err, KeywordsError::ResponseParse { .. }),
                "{body} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_invalid_preprocess_fails() {
        let body = r#"{"version": "1", "preprocess": "([", "keywords": []}"#;
        let err = Dataset::from_catalog_json(body.as_bytes(), Utc::now(), None).unwrap_err();
        assert!(matches!(err, KeywordsError::ResponseParse { .. }));
    }

    #[test]
    fn test_serde_roundtrip_keeps_regex_scope() {
        let dataset = Dataset::from_expressions(
            "7",
            vec!["sewer.?slide".into()],
            Some(&Filter::category("self-harm")),
        );
        let json = serde_json::to_string(&dataset).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dataset);

        let phrases = serde_json::to_value(Dataset::new("7", vec![])).unwrap();
        assert!(phrases.get("mode").is_none());
    }

    #[test]
    fn test_serde_roundtrip_keeps_preprocess() {
        let dataset = Dataset::new("7", vec![KeywordEntry::new("kms", "self-harm")])
            .with_preprocess(Normalizer::with_pattern("[^a-z]").unwrap());
        let json = serde_json::to_string(&dataset).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dataset);
    }
}
