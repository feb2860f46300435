//! Wake phrase matching
//!
//! The wake phrase is the user's configured assistant name. A recognized
//! transcript triggers a turn when it contains the phrase, ignoring case.

/// Case-insensitive wake phrase matcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WakePhrase {
    /// Normalized (trimmed, lowercased) phrase; `None` never matches
    phrase: Option<String>,
}

impl WakePhrase {
    /// Create a matcher from an optional assistant name
    ///
    /// A missing or blank name produces a matcher that never fires.
    #[must_use]
    pub fn new(name: Option<&str>) -> Self {
        let phrase = name
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty());

        if phrase.is_none() {
            tracing::warn!("no assistant name configured, wake phrase disabled");
        } else {
            tracing::debug!(wake_phrase = ?phrase, "wake phrase configured");
        }

        Self { phrase }
    }

    /// Check whether the transcript contains the wake phrase
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        self.phrase
            .as_deref()
            .is_some_and(|phrase| transcript.to_lowercase().contains(phrase))
    }

    /// Whether a phrase is configured
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.phrase.is_some()
    }

    /// The normalized phrase
    #[must_use]
    pub fn phrase(&self) -> Option<&str> {
        self.phrase.as_deref()
    }
}
