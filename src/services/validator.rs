//! Output validation and repair for the provider's structured response.
//!
//! The provider cannot be fully trusted: output may be malformed,
//! over-generated, or drift from the requested constraints. This stage takes
//! whatever parsed into JSON and always produces a well-formed,
//! catalog-consistent envelope.

use crate::models::{ChatEnvelope, Recommendation};
use crate::services::catalog::CatalogSnapshot;
use crate::services::geo::normalize_text;
use crate::services::intent;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Shown when the request carries no user text, and as the last-resort
/// prose fallback.
pub const PROMPT_MESSAGE: &str = "Tell me what kind of book you're looking for — vibe, \
     setting, themes, anything. I'll only recommend from the catalog.";

const NO_MATCH_MESSAGE: &str = "I couldn't find a match for that in the catalog yet. Try a \
     different country or region, or tell me a different vibe, and I'll stick to what's on \
     the list.";

const MARKDOWN_MAX_CHARS: usize = 900;
const REASON_MAX_CHARS: usize = 240;
const FOLLOW_UP_MAX_CHARS: usize = 180;
const MAX_RECOMMENDATIONS: usize = 3;
const MAX_FOLLOW_UPS: usize = 2;

static HEADING_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#{1,6}\s*").unwrap());
static BULLET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*•]\s+").unwrap());
static NUMBERED_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+\.\s+").unwrap());
static EXTRA_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Character-boundary-safe truncation.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Strip heading, bullet, and numbered-list markers, collapse runs of blank
/// lines, and bound the length.
pub fn sanitize_markdown(md: &str) -> String {
    let text = md.trim();
    if text.is_empty() {
        return String::new();
    }

    let text = HEADING_MARKER.replace_all(text, "");
    let text = BULLET_MARKER.replace_all(&text, "");
    let text = NUMBERED_MARKER.replace_all(&text, "");
    let text = EXTRA_NEWLINES.replace_all(&text, "\n\n");

    truncate_chars(text.trim(), MARKDOWN_MAX_CHARS)
        .trim_end()
        .to_string()
}

/// Deterministic prose for a surviving recommendation set.
///
/// The template varies by count; when a title or author is missing for the
/// 2- or 3-pick templates, degrades to naming only the top pick.
pub fn synced_markdown(snapshot: &CatalogSnapshot, recs: &[Recommendation]) -> String {
    if recs.is_empty() {
        return String::new();
    }

    let fmt = |book_id: &str| -> (String, String) {
        match snapshot.by_id.get(book_id) {
            Some(book) => (
                book.title.trim().to_string(),
                book.author.trim().to_string(),
            ),
            None => (String::new(), String::new()),
        }
    };

    if recs.len() == 1 {
        let (title, author) = fmt(&recs[0].book_id);
        let reason = recs[0].reason.trim();
        if !title.is_empty() && !author.is_empty() {
            if !reason.is_empty() {
                return sanitize_markdown(&format!(
                    "I recommend **{}** by {}. {}",
                    title, author, reason
                ));
            }
            return sanitize_markdown(&format!("I recommend **{}** by {}.", title, author));
        }
        return String::new();
    }

    let items = &recs[..recs.len().min(MAX_RECOMMENDATIONS)];
    let (t1, a1) = fmt(&items[0].book_id);
    let top_pick = || {
        if !t1.is_empty() && !a1.is_empty() {
            sanitize_markdown(&format!("My top pick is **{}** by {}.", t1, a1))
        } else {
            String::new()
        }
    };

    if items.len() == 2 {
        let (t2, a2) = fmt(&items[1].book_id);
        if !t1.is_empty() && !a1.is_empty() && !t2.is_empty() && !a2.is_empty() {
            return sanitize_markdown(&format!(
                "Two good picks: **{}** by {} and **{}** by {}.",
                t1, a1, t2, a2
            ));
        }
        return top_pick();
    }

    let (t2, a2) = fmt(&items[1].book_id);
    let (t3, a3) = fmt(&items[2].book_id);
    if [&t1, &a1, &t2, &a2, &t3, &a3].iter().all(|s| !s.is_empty()) {
        return sanitize_markdown(&format!(
            "Three picks: **{}** by {}, **{}** by {}, and **{}** by {}.",
            t1, a1, t2, a2, t3, a3
        ));
    }
    top_pick()
}

/// Validate and repair a parsed provider payload into the response envelope.
///
/// Total: accepts any JSON value, including garbage, and never fails.
pub fn validate(
    parsed: &Value,
    snapshot: &CatalogSnapshot,
    user_text: &str,
    build: &str,
) -> ChatEnvelope {
    let wants_single = intent::wants_single(user_text);

    let mut assistant_markdown = sanitize_markdown(
        parsed
            .get("assistant_markdown")
            .and_then(Value::as_str)
            .unwrap_or(""),
    );

    let raw_recs = parsed
        .get("recommendations")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let raw_fups = parsed
        .get("follow_up_questions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut clean_recs: Vec<Recommendation> = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for entry in raw_recs {
        let Some(obj) = entry.as_object() else { continue };
        let Some(book_id) = obj.get("book_id").and_then(Value::as_str) else {
            continue;
        };
        let Some(reason) = obj.get("reason").and_then(Value::as_str) else {
            continue;
        };
        if !snapshot.by_id.contains_key(book_id) || !seen_ids.insert(book_id) {
            continue;
        }
        clean_recs.push(Recommendation {
            book_id: book_id.to_string(),
            reason: truncate_chars(reason.trim(), REASON_MAX_CHARS),
        });
    }

    if wants_single && clean_recs.len() > 1 {
        clean_recs.truncate(1);
    }
    if !wants_single && clean_recs.len() > MAX_RECOMMENDATIONS {
        clean_recs.truncate(MAX_RECOMMENDATIONS);
    }

    let clean_fups: Vec<String> = raw_fups
        .iter()
        .take(MAX_FOLLOW_UPS)
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| truncate_chars(q, FOLLOW_UP_MAX_CHARS))
        .collect();

    if clean_recs.is_empty() {
        if assistant_markdown.is_empty() {
            assistant_markdown = NO_MATCH_MESSAGE.to_string();
        }
        return ChatEnvelope {
            assistant_markdown,
            recommendations: Vec::new(),
            follow_up_questions: clean_fups,
            actions: Vec::new(),
            build: build.to_string(),
            debug: None,
        };
    }

    if !assistant_markdown.is_empty() {
        let md_norm = normalize_text(&assistant_markdown);
        let all_mentioned = clean_recs.iter().all(|rec| {
            let Some(book) = snapshot.by_id.get(&rec.book_id) else {
                return true;
            };
            let title = normalize_text(book.title.trim());
            title.is_empty() || md_norm.contains(&title)
        });
        if !all_mentioned {
            let fallback = synced_markdown(snapshot, &clean_recs);
            if !fallback.is_empty() {
                assistant_markdown = fallback;
            }
        }
    } else {
        let fallback = synced_markdown(snapshot, &clean_recs);
        if !fallback.is_empty() {
            assistant_markdown = fallback;
        }
    }

    if assistant_markdown.is_empty() {
        assistant_markdown = PROMPT_MESSAGE.to_string();
    }

    ChatEnvelope {
        assistant_markdown,
        recommendations: clean_recs,
        follow_up_questions: clean_fups,
        actions: Vec::new(),
        build: build.to_string(),
        debug: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoreDocument;
    use serde_json::json;

    fn snapshot() -> CatalogSnapshot {
        let docs: Vec<StoreDocument> = serde_json::from_value(json!([
            {"id": "b1", "title": "The Quiet Harbor", "author": "Mina Sato", "setting_country": "JP"},
            {"id": "b2", "title": "Red Earth Road", "author": "Kwame Mensah", "setting_country": "GH"},
            {"id": "b3", "title": "Glacier Songs", "author": "Elin Dahl", "setting_country": "NO"},
            {"id": "b4", "title": "Nameless", "author": "", "setting_country": "AR"},
        ]))
        .unwrap();
        CatalogSnapshot::index(docs)
    }

    #[test]
    fn garbage_input_yields_apology_envelope() {
        let snap = snapshot();
        for parsed in [json!({}), json!(null), json!("text"), json!([1, 2])] {
            let envelope = validate(&parsed, &snap, "anything", "test-build");
            assert!(envelope.recommendations.is_empty());
            assert!(envelope.assistant_markdown.contains("couldn't find a match"));
            assert!(envelope.actions.is_empty());
            assert_eq!(envelope.build, "test-build");
        }
    }

    #[test]
    fn unknown_book_ids_are_dropped() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "Try **Ghost Book** by Nobody.",
            "recommendations": [{"book_id": "nope", "reason": "it does not exist"}],
        });

        let envelope = validate(&parsed, &snap, "anything", "b");
        assert!(envelope.recommendations.is_empty());
        // The only rec was dropped, but the model's prose survives the
        // empty-recommendation path untouched.
        assert_eq!(envelope.assistant_markdown, "Try **Ghost Book** by Nobody.");
    }

    #[test]
    fn unknown_only_rec_with_empty_prose_falls_back_to_apology() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "",
            "recommendations": [{"book_id": "nope", "reason": "x"}],
        });

        let envelope = validate(&parsed, &snap, "anything", "b");
        assert!(envelope.recommendations.is_empty());
        assert!(envelope.assistant_markdown.contains("couldn't find a match"));
    }

    #[test]
    fn single_intent_keeps_only_first_recommendation() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "",
            "recommendations": [
                {"book_id": "b1", "reason": "one"},
                {"book_id": "b2", "reason": "two"},
                {"book_id": "b3", "reason": "three"},
            ],
        });

        let envelope = validate(&parsed, &snap, "just one please", "b");
        assert_eq!(envelope.recommendations.len(), 1);
        assert_eq!(envelope.recommendations[0].book_id, "b1");
        assert!(envelope.assistant_markdown.contains("The Quiet Harbor"));
    }

    #[test]
    fn multi_intent_caps_at_three() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "",
            "recommendations": [
                {"book_id": "b1", "reason": "r"},
                {"book_id": "b2", "reason": "r"},
                {"book_id": "b3", "reason": "r"},
                {"book_id": "b4", "reason": "r"},
            ],
        });

        let envelope = validate(&parsed, &snap, "what should I read", "b");
        assert_eq!(envelope.recommendations.len(), 3);
    }

    #[test]
    fn duplicates_and_malformed_entries_are_dropped() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "",
            "recommendations": [
                {"book_id": "b1", "reason": "first"},
                {"book_id": "b1", "reason": "again"},
                "not an object",
                {"reason": "missing id"},
                {"book_id": "b2"},
                {"book_id": "b2", "reason": "kept"},
            ],
        });

        let envelope = validate(&parsed, &snap, "anything", "b");
        let ids: Vec<&str> = envelope
            .recommendations
            .iter()
            .map(|r| r.book_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b1", "b2"]);
        assert_eq!(envelope.recommendations[0].reason, "first");
    }

    #[test]
    fn empty_prose_synthesizes_mention_of_the_title() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "",
            "recommendations": [{"book_id": "b1", "reason": "A calm coastal story."}],
        });

        let envelope = validate(&parsed, &snap, "anything", "b");
        assert!(envelope
            .assistant_markdown
            .contains("**The Quiet Harbor** by Mina Sato"));
        assert!(envelope.assistant_markdown.contains("A calm coastal story."));
    }

    #[test]
    fn prose_missing_a_title_is_replaced_by_synthesis() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "You should absolutely read **Red Earth Road** by Kwame Mensah.",
            "recommendations": [
                {"book_id": "b1", "reason": "r1"},
                {"book_id": "b2", "reason": "r2"},
            ],
        });

        let envelope = validate(&parsed, &snap, "anything", "b");
        assert!(envelope.assistant_markdown.contains("The Quiet Harbor"));
        assert!(envelope.assistant_markdown.contains("Red Earth Road"));
        assert!(envelope.assistant_markdown.starts_with("Two good picks:"));
    }

    #[test]
    fn consistent_prose_is_kept_verbatim() {
        let snap = snapshot();
        let prose = "For a quiet trip, **The Quiet Harbor** by Mina Sato is hard to beat.";
        let parsed = json!({
            "assistant_markdown": prose,
            "recommendations": [{"book_id": "b1", "reason": "r"}],
        });

        let envelope = validate(&parsed, &snap, "anything", "b");
        assert_eq!(envelope.assistant_markdown, prose);
    }

    #[test]
    fn three_pick_template_degrades_when_an_author_is_missing() {
        let snap = snapshot();
        let recs = vec![
            Recommendation {
                book_id: "b1".to_string(),
                reason: String::new(),
            },
            Recommendation {
                book_id: "b2".to_string(),
                reason: String::new(),
            },
            Recommendation {
                book_id: "b4".to_string(),
                reason: String::new(),
            },
        ];

        let md = synced_markdown(&snap, &recs);
        assert_eq!(md, "My top pick is **The Quiet Harbor** by Mina Sato.");
    }

    #[test]
    fn three_pick_template_names_all_three() {
        let snap = snapshot();
        let recs: Vec<Recommendation> = ["b1", "b2", "b3"]
            .iter()
            .map(|id| Recommendation {
                book_id: id.to_string(),
                reason: String::new(),
            })
            .collect();

        let md = synced_markdown(&snap, &recs);
        assert!(md.starts_with("Three picks:"));
        for title in ["The Quiet Harbor", "Red Earth Road", "Glacier Songs"] {
            assert!(md.contains(title));
        }
    }

    #[test]
    fn follow_ups_take_first_two_and_truncate() {
        let snap = snapshot();
        let long = "q".repeat(200);
        let parsed = json!({
            "assistant_markdown": "",
            "recommendations": [],
            "follow_up_questions": [long, "  second?  ", "third"],
        });

        let envelope = validate(&parsed, &snap, "anything", "b");
        assert_eq!(envelope.follow_up_questions.len(), 2);
        assert_eq!(envelope.follow_up_questions[0].chars().count(), 180);
        assert_eq!(envelope.follow_up_questions[1], "second?");
    }

    #[test]
    fn reasons_are_trimmed_and_bounded() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "",
            "recommendations": [{"book_id": "b1", "reason": format!("  {}  ", "r".repeat(300))}],
        });

        let envelope = validate(&parsed, &snap, "anything", "b");
        assert_eq!(envelope.recommendations[0].reason.chars().count(), 240);
    }

    #[test]
    fn sanitize_strips_list_syntax_and_collapses_newlines() {
        let input = "# Heading\n- bullet one\n* bullet two\n2. numbered\n\n\n\nplain tail";
        let out = sanitize_markdown(input);
        assert!(!out.contains('#'));
        assert!(!out.contains("- "));
        assert!(!out.contains("* "));
        assert!(!out.contains("2. "));
        assert!(!out.contains("\n\n\n"));
        assert!(out.contains("plain tail"));
    }

    #[test]
    fn sanitize_bounds_length_at_900_chars() {
        let input = "a".repeat(1200);
        assert_eq!(sanitize_markdown(&input).chars().count(), 900);
    }

    #[test]
    fn validator_is_idempotent_on_its_own_output() {
        let snap = snapshot();
        let parsed = json!({
            "assistant_markdown": "## Picks\n- Read **The Quiet Harbor** by Mina Sato today",
            "recommendations": [
                {"book_id": "b1", "reason": "  calm  "},
                {"book_id": "b1", "reason": "duplicate"},
                {"book_id": "missing", "reason": "gone"},
            ],
            "follow_up_questions": ["Want something longer?"],
        });

        let first = validate(&parsed, &snap, "anything", "b");
        let second = validate(
            &serde_json::to_value(&first).unwrap(),
            &snap,
            "anything",
            "b",
        );
        assert_eq!(first, second);
    }
}
