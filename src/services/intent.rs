//! Heuristic detection of "give me exactly one book" requests.
//!
//! Deliberately not a model call: a fixed trigger list over normalized text,
//! constant time, no external dependency.

use crate::services::geo::normalize_text;

const SUBSTRING_TRIGGERS: &[&str] = &[
    "top rec",
    "top recommendation",
    "just one",
    "only one",
    "one book",
    "one recommendation",
    "one rec",
    "single recommendation",
    "single rec",
];

const PREFIX_TRIGGERS: &[&str] = &["give me a book", "recommend a book"];

/// True when the user is asking for a single recommendation rather than a
/// short list.
pub fn wants_single(user_text: &str) -> bool {
    let q = normalize_text(user_text);
    if q.is_empty() {
        return false;
    }

    if SUBSTRING_TRIGGERS.iter().any(|t| q.contains(t)) {
        return true;
    }

    PREFIX_TRIGGERS.iter().any(|t| q.starts_with(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_triggers_match() {
        assert!(wants_single("What's your top rec for Brazil?"));
        assert!(wants_single("Just one, please"));
        assert!(wants_single("I want ONE BOOK about the sea"));
        assert!(wants_single("a single recommendation will do"));
        assert!(wants_single("Give me a book set in Japan"));
        assert!(wants_single("Recommend a book, any book"));
    }

    #[test]
    fn multi_requests_do_not_match() {
        assert!(!wants_single("What should I read next?"));
        assert!(!wants_single("Books set in West Africa"));
        assert!(!wants_single("Some recommendations for a rainy weekend"));
    }

    #[test]
    fn empty_text_is_not_single() {
        assert!(!wants_single(""));
        assert!(!wants_single("   "));
        assert!(!wants_single("?!"));
    }

    #[test]
    fn prefix_triggers_only_match_at_the_start() {
        assert!(!wants_single("Could you recommend a books list"));
        assert!(!wants_single("My friend said to give me a call"));
    }
}
