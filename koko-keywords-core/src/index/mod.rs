//! Query-optimized keyword index
//!
//! A [`KeywordIndex`] is built once per [`Dataset`] and never mutated. All
//! distinct normalized phrases go into one Aho-Corasick automaton, so a
//! lookup costs one pass over the (normalized) input regardless of how many
//! keywords the catalog holds. Each automaton pattern maps back to the
//! entries that share it, which is where filters are applied.
//!
//! Regex catalogs compile into one [`RegexSet`] instead, with one pattern
//! per entry.

mod normalize;

pub use normalize::Normalizer;

use aho_corasick::AhoCorasick;
use regex::RegexSet;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::{Dataset, KeywordEntry, MatchMode};
use crate::error::KeywordsError;
use crate::filter::Filter;

/// Read-only match structure over one dataset
#[derive(Debug)]
pub struct KeywordIndex {
    dataset: Arc<Dataset>,
    patterns: Patterns,
}

#[derive(Debug)]
enum Patterns {
    Phrases {
        /// `None` when no entry survives normalization
        automaton: Option<AhoCorasick>,
        /// Automaton pattern id → entry positions in `dataset.entries`
        pattern_entries: Vec<Vec<usize>>,
    },
    /// Pattern id is the entry position
    Expressions(RegexSet),
}

impl KeywordIndex {
    /// Build the index for a dataset
    ///
    /// Fails only if the automaton or expression set cannot be constructed,
    /// reported as a parse failure.
    pub fn build(dataset: Arc<Dataset>) -> Result<Self, KeywordsError> {
        let patterns = match dataset.mode {
            MatchMode::Phrase => build_phrases(&dataset)?,
            MatchMode::Regex => Patterns::Expressions(
                RegexSet::new(dataset.entries.iter().map(|e| e.keyword.as_str()))
                    .map_err(|e| KeywordsError::parse("catalog could not be indexed", e))?,
            ),
        };

        let index = Self { dataset, patterns };
        debug!(
            "Built keyword index for catalog {}: {} entries, {} distinct patterns",
            index.version(),
            index.entry_count(),
            index.pattern_count()
        );
        Ok(index)
    }

    /// Whether `text` contains any participating keyword
    pub fn lookup(&self, text: &str, filter: Option<&Filter>) -> bool {
        match &self.patterns {
            Patterns::Phrases { automaton, .. } => {
                let Some(automaton) = automaton else {
                    return false;
                };

                let normalized = self.dataset.preprocess.normalize(text);
                if normalized.is_empty() {
                    return false;
                }

                match filter {
                    None => automaton.is_match(&normalized),
                    Some(filter) => automaton
                        .find_overlapping_iter(&normalized)
                        .any(|m| self.any_accepted(m.pattern().as_usize(), filter)),
                }
            }
            Patterns::Expressions(set) => {
                let stripped = self.dataset.preprocess.strip(text);
                match filter {
                    None => set.is_match(&stripped),
                    Some(filter) => set
                        .matches(&stripped)
                        .into_iter()
                        .any(|i| filter.accepts(&self.dataset.entries[i])),
                }
            }
        }
    }

    /// Entries whose phrase occurs in `text`, in catalog order
    pub fn matching_entries(&self, text: &str, filter: Option<&Filter>) -> Vec<&KeywordEntry> {
        let mut positions: Vec<usize> = match &self.patterns {
            Patterns::Phrases {
                automaton: Some(automaton),
                pattern_entries,
            } => {
                let normalized = self.dataset.preprocess.normalize(text);
                automaton
                    .find_overlapping_iter(&normalized)
                    .flat_map(|m| pattern_entries[m.pattern().as_usize()].iter().copied())
                    .collect()
            }
            Patterns::Phrases { automaton: None, .. } => Vec::new(),
            Patterns::Expressions(set) => set
                .matches(&self.dataset.preprocess.strip(text))
                .into_iter()
                .collect(),
        };
        positions.retain(|&i| filter.map_or(true, |f| f.accepts(&self.dataset.entries[i])));
        positions.sort_unstable();
        positions.dedup();

        positions
            .into_iter()
            .map(|i| &self.dataset.entries[i])
            .collect()
    }

    fn any_accepted(&self, pattern: usize, filter: &Filter) -> bool {
        let Patterns::Phrases { pattern_entries, .. } = &self.patterns else {
            return false;
        };
        pattern_entries[pattern]
            .iter()
            .any(|&i| filter.accepts(&self.dataset.entries[i]))
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn version(&self) -> &str {
        &self.dataset.version
    }

    pub fn entry_count(&self) -> usize {
        self.dataset.entries.len()
    }

    /// Number of distinct normalized phrases, or of expressions
    pub fn pattern_count(&self) -> usize {
        match &self.patterns {
            Patterns::Phrases { pattern_entries, .. } => pattern_entries.len(),
            Patterns::Expressions(set) => set.len(),
        }
    }

    /// Entry count per category
    pub fn categories(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.dataset.entries {
            *counts.entry(entry.category.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

fn build_phrases(dataset: &Dataset) -> Result<Patterns, KeywordsError> {
    let mut patterns: Vec<String> = Vec::new();
    let mut pattern_entries: Vec<Vec<usize>> = Vec::new();
    let mut by_phrase: HashMap<String, usize> = HashMap::new();

    for (position, entry) in dataset.entries.iter().enumerate() {
        let phrase = dataset.preprocess.normalize(&entry.keyword);
        if phrase.is_empty() {
            warn!(
                "Skipping keyword #{} of catalog {}: empty after normalization",
                position, dataset.version
            );
            continue;
        }

        let id = *by_phrase.entry(phrase).or_insert_with_key(|phrase| {
            patterns.push(phrase.clone());
            pattern_entries.push(Vec::new());
            patterns.len() - 1
        });
        pattern_entries[id].push(position);
    }

    let automaton = if patterns.is_empty() {
        None
    } else {
        Some(
            AhoCorasick::new(&patterns)
                .map_err(|e| KeywordsError::parse("catalog could not be indexed", e))?,
        )
    };

    Ok(Patterns::Phrases {
        automaton,
        pattern_entries,
    })
}
