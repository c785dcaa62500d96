//! Text normalization shared by keywords and query text
//!
//! Both sides of a match go through the same [`Normalizer`]: Unicode
//! lower-casing, then removal of every character the catalog's
//! `preprocess` pattern selects. Without a pattern, everything that is not a
//! letter or a digit is removed, so `"Sewer Slide!"` and `"sewerslide"`
//! normalize identically.

use regex::Regex;
use std::borrow::Cow;
use tracing::trace;

/// Catalog-defined text normalizer
///
/// Serializes as the raw `preprocess` pattern (`null` for the default).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Option<String>", into = "Option<String>")]
pub struct Normalizer {
    strip: Option<Regex>,
}

impl Normalizer {
    /// Normalizer using a custom strip pattern
    pub fn with_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            strip: Some(Regex::new(pattern)?),
        })
    }

    /// The custom pattern, if any
    pub fn pattern(&self) -> Option<&str> {
        self.strip.as_ref().map(Regex::as_str)
    }

    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let normalized = match &self.strip {
            Some(re) => re.replace_all(&lowered, "").into_owned(),
            None => lowered.chars().filter(|c| c.is_alphanumeric()).collect(),
        };
        trace!("Normalized text: '{}' → '{}'", text, normalized);
        normalized
    }

    /// Remove what the custom pattern selects, leaving case untouched
    ///
    /// Used for regex catalogs, whose expressions carry their own case rules.
    /// Without a custom pattern the text is returned as is.
    pub fn strip<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.strip {
            Some(re) => re.replace_all(text, ""),
            None => Cow::Borrowed(text),
        }
    }
}

impl PartialEq for Normalizer {
    fn eq(&self, other: &Self) -> bool {
        self.pattern() == other.pattern()
    }
}

impl Eq for Normalizer {}

impl TryFrom<Option<String>> for Normalizer {
    type Error = regex::Error;

    fn try_from(pattern: Option<String>) -> Result<Self, Self::Error> {
        match pattern {
            Some(p) => Self::with_pattern(&p),
            None => Ok(Self::default()),
        }
    }
}

impl From<Normalizer> for Option<String> {
    fn from(normalizer: Normalizer) -> Self {
        normalizer.pattern().map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strips_everything_but_letters_and_digits() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("it's all good"), "itsallgood");
        assert_eq!(n.normalize("Sewer  Slide!"), "sewerslide");
        assert_eq!(n.normalize("sewerxx   slide"), "sewerxxslide");
        assert_eq!(n.normalize("  \t\n"), "");
    }

    #[test]
    fn test_default_keeps_non_ascii_letters() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("Suicídio, já"), "suicídiojá");
    }

    #[test]
    fn test_custom_pattern_runs_after_lowercasing() {
        let n = Normalizer::with_pattern("[^a-z]").unwrap();
        assert_eq!(n.normalize("KMS 4 real"), "kmsreal");
        assert_eq!(n.pattern(), Some("[^a-z]"));
    }

    #[test]
    fn test_strip_keeps_case() {
        let n = Normalizer::with_pattern(r"\s").unwrap();
        assert_eq!(n.strip("Sewer Slide"), "SewerSlide");
        assert_eq!(Normalizer::default().strip("Sewer Slide!"), "Sewer Slide!");
    }

    #[test]
    fn test_serde_as_pattern_string() {
        let n: Normalizer = serde_json::from_str(r#""\\s+""#).unwrap();
        assert_eq!(n.pattern(), Some(r"\s+"));
        assert_eq!(serde_json::to_string(&n).unwrap(), r#""\\s+""#);

        let d: Normalizer = serde_json::from_str("null").unwrap();
        assert_eq!(d, Normalizer::default());
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let result: Result<Normalizer, _> = serde_json::from_str(r#""([a-z""#);
        assert!(result.is_err());
    }
}
