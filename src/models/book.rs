use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::services::geo;

fn deserialize_lossy_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        String(String),
        Int(i64),
        Float(f64),
        Bool(bool),
        Other(Value),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::String(s) => s.trim().to_string(),
        Loose::Int(n) => n.to_string(),
        Loose::Float(f) => f.to_string(),
        Loose::Bool(b) => b.to_string(),
        Loose::Other(_) => String::new(),
    })
}

fn deserialize_page_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Int(i64),
        Float(f64),
        String(String),
        Other(Value),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Int(n) => n.max(0) as u32,
        Loose::Float(f) if f.is_finite() && f >= 0.0 => f as u32,
        Loose::Float(_) => 0,
        Loose::String(s) => s.trim().parse().unwrap_or(0),
        Loose::Other(_) => 0,
    })
}

fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        List(Vec<Value>),
        Other(Value),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::List(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Loose::Other(_) => Vec::new(),
    })
}

/// A raw catalog document as returned by the store.
///
/// Every field tolerates absent or wrong-typed input and degrades to a safe
/// default so that a single malformed document never fails a catalog refresh.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreDocument {
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub author: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub summary: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub year: String,
    #[serde(default, deserialize_with = "deserialize_page_count")]
    pub page_count: u32,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub categories: Vec<String>,
    // Geography sources may arrive as a string, a list, an object, or null.
    // They are kept raw here and normalized uniformly at index time.
    #[serde(default)]
    pub country_override: Value,
    #[serde(default)]
    pub setting_country: Value,
    #[serde(default)]
    pub author_country: Value,
    #[serde(default)]
    pub author_origin: Value,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub cover_url: String,
    #[serde(default, deserialize_with = "deserialize_lossy_string")]
    pub bookshop_url: String,
}

/// A normalized country reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub iso2: String,
    pub name: String,
}

/// Normalized places per geography role, first-seen order, deduplicated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Places {
    #[serde(rename = "override")]
    pub override_: Vec<Place>,
    pub setting: Vec<Place>,
    pub author_country: Vec<Place>,
    pub author_origin: Vec<Place>,
}

/// ISO2 code sets per semantic bucket.
///
/// `any` is the union of all buckets and is what drives the catalog-wide
/// country list.
#[derive(Debug, Clone, Default)]
pub struct Iso2Sets {
    pub override_: BTreeSet<String>,
    pub setting: BTreeSet<String>,
    pub author: BTreeSet<String>,
    pub any: BTreeSet<String>,
}

impl Iso2Sets {
    fn from_places(places: &Places) -> Self {
        let as_set = |list: &[Place]| -> BTreeSet<String> {
            list.iter().map(|p| p.iso2.to_uppercase()).collect()
        };

        let override_ = as_set(&places.override_);
        let setting = as_set(&places.setting);
        let mut author = as_set(&places.author_country);
        author.extend(as_set(&places.author_origin));

        let mut any = override_.clone();
        any.extend(setting.iter().cloned());
        any.extend(author.iter().cloned());

        Iso2Sets {
            override_,
            setting,
            author,
            any,
        }
    }
}

/// A fully indexed catalog record.
///
/// The derived fields (`places`, `iso2_sets`, `search_blob`) are pure
/// functions of the source document and are only recomputed by a full
/// re-index.
#[derive(Debug, Clone)]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub description: String,
    pub year: String,
    pub page_count: u32,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub cover_url: String,
    pub bookshop_url: String,
    pub places: Places,
    pub iso2_sets: Iso2Sets,
    pub search_blob: String,
}

impl BookRecord {
    /// Build an indexed record from a raw store document.
    ///
    /// This is the single place where loose store data becomes the typed
    /// record the rest of the pipeline relies on.
    pub fn from_document(doc: StoreDocument) -> Self {
        let places = Places {
            override_: places_from(&doc.country_override),
            setting: places_from(&doc.setting_country),
            author_country: places_from(&doc.author_country),
            author_origin: places_from(&doc.author_origin),
        };
        let iso2_sets = Iso2Sets::from_places(&places);
        let search_blob = build_search_blob(&doc, &places);

        BookRecord {
            id: doc.id,
            title: doc.title,
            author: doc.author,
            summary: doc.summary,
            description: doc.description,
            year: doc.year,
            page_count: doc.page_count,
            tags: doc.tags,
            categories: doc.categories,
            cover_url: doc.cover_url,
            bookshop_url: doc.bookshop_url,
            places,
            iso2_sets,
            search_blob,
        }
    }
}

fn places_from(value: &Value) -> Vec<Place> {
    geo::extract_candidates(value)
        .into_iter()
        .map(|iso2| {
            let name = geo::name_for(&iso2);
            let name = if name.is_empty() { iso2.clone() } else { name };
            Place { iso2, name }
        })
        .collect()
}

fn build_search_blob(doc: &StoreDocument, places: &Places) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for v in [
        &doc.title,
        &doc.author,
        &doc.summary,
        &doc.description,
        &doc.year,
    ] {
        if !v.is_empty() {
            parts.push(v);
        }
    }

    for list in [&doc.tags, &doc.categories] {
        parts.extend(list.iter().map(String::as_str).filter(|s| !s.trim().is_empty()));
    }

    for list in [
        &places.override_,
        &places.setting,
        &places.author_country,
        &places.author_origin,
    ] {
        for place in list {
            parts.push(&place.iso2);
            if place.name != place.iso2 {
                parts.push(&place.name);
            }
        }
    }

    geo::normalize_text(&parts.join(" "))
}
