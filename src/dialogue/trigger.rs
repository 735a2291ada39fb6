//! Record-lookup trigger policy
//!
//! Decides whether an utterance should force a record lookup before the
//! model answers, and pulls a likely record key (patient name) out of the
//! text for the direct-lookup fallback. The built-in patterns can be
//! extended through configuration.

use regex::Regex;

use crate::Result;
use crate::config::DialogueConfig;
use crate::error::Error;

/// Built-in phrases that indicate a patient is being referenced
const DEFAULT_PATTERNS: &[&str] = &[
    r"patient\s+name",
    r"patient\s+is",
    r"patient\s+called",
    r"mr\.?\s+\w+",
    r"ms\.?\s+\w+",
    r"mrs\.?\s+\w+",
    r"dr\.?\s+\w+",
    r"my\s+patient",
    r"the\s+patient",
    r"this\s+patient",
];

const SUMMARY_KEYWORDS: &[&str] =
    &["summarize", "summary", "overview", "last visit", "recent", "history"];

const MEDICATION_KEYWORDS: &[&str] = &[
    "medication",
    "medicines",
    "drugs",
    "prescribed",
    "prescription",
    "taking",
];

pub struct TriggerPolicy {
    patterns: Vec<Regex>,
    /// Record keys matched verbatim, e.g. known patient names
    known_keys: Vec<String>,
    name_extract: Regex,
}

impl TriggerPolicy {
    /// Build the policy from built-in patterns plus configured extras.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a configured pattern is not a valid
    /// regular expression.
    pub fn new(extra_patterns: &[String], known_keys: Vec<String>) -> Result<Self> {
        let mut patterns = Vec::with_capacity(DEFAULT_PATTERNS.len() + extra_patterns.len());
        for raw in DEFAULT_PATTERNS.iter().copied().chain(extra_patterns.iter().map(String::as_str))
        {
            let compiled = Regex::new(&format!("(?i){raw}"))
                .map_err(|e| Error::Config(format!("invalid trigger pattern '{raw}': {e}")))?;
            patterns.push(compiled);
        }
        let name_extract = Regex::new(
            r"(?:(?i:patient\s+(?:name\s+)?(?:is\s+)?|mr\.?\s+|ms\.?\s+|mrs\.?\s+|dr\.?\s+))([A-Z][a-z]+\s+[A-Z][a-z]+)",
        )
        .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { patterns, known_keys, name_extract })
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] when a configured pattern is invalid.
    pub fn from_config(config: &DialogueConfig) -> Result<Self> {
        Self::new(&config.trigger_patterns, config.known_record_keys.clone())
    }

    /// Whether the utterance references a record subject
    #[must_use]
    pub fn matches(&self, utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        self.known_keys.iter().any(|key| lower.contains(&key.to_lowercase()))
            || self.patterns.iter().any(|p| p.is_match(utterance))
    }

    /// Best-effort record key extraction for the direct-lookup fallback
    #[must_use]
    pub fn extract_key(&self, utterance: &str) -> Option<String> {
        let lower = utterance.to_lowercase();
        if let Some(key) = self.known_keys.iter().find(|key| lower.contains(&key.to_lowercase())) {
            return Some(key.clone());
        }
        self.name_extract
            .captures(utterance)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Whether the utterance asks for a visit summary
    #[must_use]
    pub fn is_summary_request(utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        SUMMARY_KEYWORDS.iter().any(|k| lower.contains(k))
    }

    /// Whether the utterance asks about medications
    #[must_use]
    pub fn is_medication_query(utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        MEDICATION_KEYWORDS.iter().any(|k| lower.contains(k))
    }
}
