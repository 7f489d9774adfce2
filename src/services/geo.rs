//! Country normalization for heterogeneous catalog metadata.
//!
//! Catalog documents carry geography in whatever shape the curator entered:
//! free-text names, 2/3-letter codes, delimited strings, lists, or nested
//! objects. Everything funnels through [`to_iso2`] and
//! [`extract_candidates`] so the rest of the pipeline only ever sees
//! canonical ISO2 codes.

use serde_json::Value;
use std::collections::HashSet;

#[cfg(feature = "country-data")]
use std::{collections::HashMap, sync::LazyLock};

/// Common names that differ from the official ISO short names.
///
/// Keys are pre-normalized with [`normalize_text`].
#[cfg(feature = "country-data")]
const NAME_ALIASES: &[(&str, &str)] = &[
    ("united states", "US"),
    ("america", "US"),
    ("united kingdom", "GB"),
    ("great britain", "GB"),
    ("england", "GB"),
    ("scotland", "GB"),
    ("wales", "GB"),
    ("south korea", "KR"),
    ("north korea", "KP"),
    ("russia", "RU"),
    ("vietnam", "VN"),
    ("iran", "IR"),
    ("syria", "SY"),
    ("laos", "LA"),
    ("bolivia", "BO"),
    ("venezuela", "VE"),
    ("tanzania", "TZ"),
    ("czech republic", "CZ"),
    ("ivory coast", "CI"),
    ("cape verde", "CV"),
    ("moldova", "MD"),
    ("brunei", "BN"),
    ("taiwan", "TW"),
    ("palestine", "PS"),
    ("turkey", "TR"),
    ("democratic republic of the congo", "CD"),
    ("republic of the congo", "CG"),
];

#[cfg(feature = "country-data")]
static NAME_TO_ISO2: LazyLock<HashMap<String, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for country in rust_iso3166::ALL.iter() {
        map.insert(normalize_text(country.name), country.alpha2);
    }
    for (alias, code) in NAME_ALIASES {
        map.insert((*alias).to_string(), *code);
    }
    map
});

/// Lowercase, collapse non-alphanumeric runs to single spaces, trim.
///
/// Shared normalization for name lookups, intent triggers, and the
/// title-mention consistency check.
pub fn normalize_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim_end().to_string()
}

/// Interpret a single value as an ISO2 country code.
///
/// Two alphabetic characters pass through uppercased without validation, so
/// callers must tolerate garbage 2-letter input. Three alphabetic characters
/// go through the alpha-3 table; anything else is looked up by name. Both
/// lookups degrade to a miss when the `country-data` feature is disabled.
pub fn to_iso2(value: &str) -> Option<String> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let spaced = raw.replace(['_', '-'], " ");
    let t = spaced.trim();

    if t.len() == 2 && t.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(t.to_ascii_uppercase());
    }

    if t.len() == 3 && t.chars().all(|c| c.is_ascii_alphabetic()) {
        if let Some(code) = alpha3_to_alpha2(&t.to_ascii_uppercase()) {
            return Some(code);
        }
    }

    lookup_name(raw)
}

/// Normalize any JSON geography value into a deduplicated ISO2 list.
///
/// Objects are probed on the well-known keys first, then on every string or
/// list-of-scalars value; arrays per element; strings per `, ; | /`
/// segment; other scalars directly. First-seen order is preserved.
pub fn extract_candidates(value: &Value) -> Vec<String> {
    const PROBE_KEYS: [&str; 5] = ["iso2", "code", "country", "value", "name"];

    let mut out = Vec::new();
    let mut seen = HashSet::new();

    match value {
        Value::Object(map) => {
            for key in PROBE_KEYS {
                if let Some(v) = map.get(key) {
                    push_code(&mut out, &mut seen, scalar_text(v));
                }
            }
            for v in map.values() {
                match v {
                    Value::String(s) => push_code(&mut out, &mut seen, Some(s.clone())),
                    Value::Array(items) => {
                        for item in items {
                            push_code(&mut out, &mut seen, scalar_text(item));
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                push_code(&mut out, &mut seen, scalar_text(item));
            }
        }
        Value::String(s) => {
            for segment in s.split(|c| matches!(c, ',' | ';' | '|' | '/')) {
                let segment = segment.trim();
                if !segment.is_empty() {
                    push_code(&mut out, &mut seen, Some(segment.to_string()));
                }
            }
        }
        Value::Null => {}
        other => push_code(&mut out, &mut seen, scalar_text(other)),
    }

    out
}

/// Canonical country name for an ISO2 code.
///
/// Echoes the code back on a lookup miss so callers never block on name
/// resolution; malformed input yields an empty string.
pub fn name_for(iso2: &str) -> String {
    let code = iso2.trim().to_ascii_uppercase();
    if !(code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())) {
        return String::new();
    }
    resolve_name(&code).unwrap_or(code)
}

fn push_code(out: &mut Vec<String>, seen: &mut HashSet<String>, text: Option<String>) {
    let Some(text) = text else { return };
    if let Some(code) = to_iso2(&text) {
        if seen.insert(code.clone()) {
            out.push(code);
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(feature = "country-data")]
fn alpha3_to_alpha2(code: &str) -> Option<String> {
    rust_iso3166::from_alpha3(code).map(|c| c.alpha2.to_string())
}

#[cfg(not(feature = "country-data"))]
fn alpha3_to_alpha2(_code: &str) -> Option<String> {
    None
}

#[cfg(feature = "country-data")]
fn lookup_name(raw: &str) -> Option<String> {
    let key = normalize_text(raw);
    if key.is_empty() {
        return None;
    }
    NAME_TO_ISO2.get(&key).map(|code| (*code).to_string())
}

#[cfg(not(feature = "country-data"))]
fn lookup_name(_raw: &str) -> Option<String> {
    None
}

#[cfg(feature = "country-data")]
fn resolve_name(code: &str) -> Option<String> {
    rust_iso3166::from_alpha2(code).map(|c| c.name.to_string())
}

#[cfg(not(feature = "country-data"))]
fn resolve_name(_code: &str) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn two_letter_codes_pass_through_uppercased() {
        assert_eq!(to_iso2("us"), Some("US".to_string()));
        assert_eq!(to_iso2("  fr "), Some("FR".to_string()));
        // Unvalidated by contract: garbage 2-letter input passes through.
        assert_eq!(to_iso2("zz"), Some("ZZ".to_string()));
    }

    #[cfg(feature = "country-data")]
    #[test]
    fn alpha3_resolves_via_table() {
        assert_eq!(to_iso2("USA"), Some("US".to_string()));
        assert_eq!(to_iso2("jpn"), Some("JP".to_string()));
    }

    #[cfg(feature = "country-data")]
    #[test]
    fn free_text_names_resolve() {
        assert_eq!(to_iso2("France"), Some("FR".to_string()));
        assert_eq!(to_iso2("south_korea"), Some("KR".to_string()));
        assert_eq!(to_iso2("United States"), Some("US".to_string()));
    }

    #[test]
    fn unresolvable_input_is_none() {
        assert_eq!(to_iso2("not a country"), None);
        assert_eq!(to_iso2(""), None);
        assert_eq!(to_iso2("   "), None);
        assert_eq!(to_iso2("1234"), None);
    }

    #[test]
    fn candidates_from_string_split_and_dedup() {
        let codes = extract_candidates(&json!("us, jp; us | br"));
        assert_eq!(codes, vec!["US", "JP", "BR"]);
    }

    #[test]
    fn candidates_from_list() {
        let codes = extract_candidates(&json!(["de", "it", "de"]));
        assert_eq!(codes, vec!["DE", "IT"]);
    }

    #[test]
    fn candidates_from_object_probe_known_keys_first() {
        let codes = extract_candidates(&json!({
            "label": "somewhere",
            "iso2": "ng",
            "extra": ["ke", "ng"],
        }));
        assert_eq!(codes.first().map(String::as_str), Some("NG"));
        assert!(codes.contains(&"KE".to_string()));
    }

    #[test]
    fn candidates_from_null_and_scalars() {
        assert!(extract_candidates(&json!(null)).is_empty());
        assert!(extract_candidates(&json!(3.5)).is_empty());
        assert_eq!(extract_candidates(&json!("pe")), vec!["PE"]);
    }

    #[test]
    fn every_candidate_is_two_uppercase_letters() {
        let inputs = [
            json!("us, japan; XK/ZZ"),
            json!(["br", "ARG", {"ignored": true}]),
            json!({"country": "mx", "tags": ["co", "notacountry"]}),
        ];
        for input in inputs {
            for code in extract_candidates(&input) {
                assert_eq!(code.len(), 2);
                assert!(code.chars().all(|c| c.is_ascii_uppercase()));
            }
        }
    }

    #[cfg(feature = "country-data")]
    #[test]
    fn name_for_resolves_known_codes() {
        assert_eq!(name_for("fr"), "France");
        assert_eq!(name_for("JP"), "Japan");
    }

    #[test]
    fn name_for_echoes_unknown_codes_and_rejects_garbage() {
        // "ZZ" is not assigned; the code itself comes back.
        assert_eq!(name_for("ZZ"), "ZZ");
        assert_eq!(name_for("USA"), "");
        assert_eq!(name_for(""), "");
    }

    #[test]
    fn normalize_text_collapses_punctuation() {
        assert_eq!(normalize_text("  The GREAT-Gatsby!! "), "the great gatsby");
        assert_eq!(normalize_text("a\t\tb\n\nc"), "a b c");
        assert_eq!(normalize_text("!!!"), "");
    }
}
