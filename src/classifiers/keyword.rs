//! Deterministic keyword fallback used when the text classifier is down.
//!
//! Optimistic by default, punitive on hit: a banned-term match yields a
//! low-confidence unsafe verdict, no match yields a moderately confident
//! safe one. Either way submissions keep flowing while the model is
//! unreachable.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

use super::Classification;
use crate::error::{ModerationError, Result};

const MATCH_CONFIDENCE: f32 = 0.3;
const NO_MATCH_CONFIDENCE: f32 = 0.8;
const MATCH_REASON: &str = "inappropriate_content";

pub struct KeywordClassifier {
    banned_terms: HashSet<String>,
}

impl KeywordClassifier {
    /// Create a new keyword classifier from a term-list file
    pub fn new(terms_file: impl AsRef<Path>) -> Result<Self> {
        let banned_terms = Self::load_terms(terms_file)?;
        Ok(Self { banned_terms })
    }

    /// Classify text against the banned-term list
    pub fn classify(&self, text: &str) -> Classification {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized.unicode_words().collect();

        let hit = self
            .banned_terms
            .iter()
            .find(|term| words.contains(&term.as_str()));

        match hit {
            Some(term) => {
                tracing::debug!("Keyword fallback matched banned term: {}", term);
                Classification::unsafe_with(MATCH_CONFIDENCE, MATCH_REASON)
            }
            None => Classification {
                safe: true,
                confidence: NO_MATCH_CONFIDENCE,
                reasons: Vec::new(),
            },
        }
    }

    /// Load banned terms from file, skipping comments and blank lines
    fn load_terms(path: impl AsRef<Path>) -> Result<HashSet<String>> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ModerationError::Config(format!(
                "Failed to load banned terms from {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let terms = content
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .map(|line| line.trim().to_lowercase())
            .collect();

        Ok(terms)
    }
}
