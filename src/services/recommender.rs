use crate::error::{ApiError, Result};
use crate::models::{BookRecord, ChatMessage, Place, Places};
use crate::services::intent;
use crate::services::validator::truncate_chars;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/responses";
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(45);
const HISTORY_TURNS: usize = 12;
const SUMMARY_MAX_CHARS: usize = 650;
const LIST_MAX_ITEMS: usize = 16;

/// Client for the provider's structured-output endpoint.
///
/// One blocking call per request, no retries. A failed call is the caller's
/// problem to absorb.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

/// Candidate projection sent to the provider: enough metadata to ground a
/// recommendation, small enough to ship the whole catalog per request.
#[derive(Serialize)]
struct CompactCandidate<'a> {
    id: &'a str,
    title: &'a str,
    author: &'a str,
    year: &'a str,
    page_count: u32,
    tags: &'a [String],
    categories: &'a [String],
    places: &'a Places,
    summary: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Override the provider endpoint (used by tests against a mock server).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Issue the single recommendation call and parse its structured output.
    ///
    /// A non-success HTTP status is a hard error with the response body
    /// embedded. Malformed-but-present output text parses to an empty
    /// object; the validator downstream handles that case.
    pub async fn request(
        &self,
        history: &[ChatMessage],
        user_text: &str,
        selected_iso2: Option<&str>,
        available_countries: &[Place],
        candidates: &[Arc<BookRecord>],
    ) -> Result<Value> {
        let wants_single = intent::wants_single(user_text);
        let compact = compact_candidates(candidates);

        let context = json!({
            "user_text": user_text,
            "selected_iso2": selected_iso2.unwrap_or(""),
            "available_countries": available_countries,
        });

        let mut input_items = vec![
            developer_item(&format!("CONTEXT:\n{}", serde_json::to_string(&context)?)),
            developer_item(&format!(
                "CANDIDATES:\n{}",
                serde_json::to_string(&compact)?
            )),
        ];

        let start = history.len().saturating_sub(HISTORY_TURNS);
        for message in &history[start..] {
            let role = message.role.trim().to_lowercase();
            let content = message.content.trim();
            if content.is_empty() {
                continue;
            }
            match role.as_str() {
                "user" => input_items.push(json!({
                    "role": "user",
                    "content": [{"type": "input_text", "text": content}],
                })),
                "assistant" => input_items.push(json!({
                    "role": "assistant",
                    "content": [{"type": "output_text", "text": content}],
                })),
                _ => {}
            }
        }

        debug!(
            "requesting recommendation: candidates={} history_turns={} single={}",
            compact.len(),
            input_items.len().saturating_sub(2),
            wants_single
        );

        let payload = json!({
            "model": &self.model,
            "instructions": build_instructions(wants_single),
            "input": input_items,
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": "book_chat_response",
                    "strict": true,
                    "schema": response_schema(),
                }
            },
            "temperature": 0.35,
            "max_output_tokens": 900,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(PROVIDER_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ApiError::ExternalServiceError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::ExternalServiceError(format!(
                "OpenAI HTTP {}: {}",
                status, body
            )));
        }

        let resp_json: Value = response
            .json()
            .await
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;

        Ok(parse_output_text(&resp_json))
    }
}

fn developer_item(text: &str) -> Value {
    json!({
        "role": "developer",
        "content": [{"type": "input_text", "text": text}],
    })
}

fn compact_candidates(candidates: &[Arc<BookRecord>]) -> Vec<CompactCandidate<'_>> {
    candidates
        .iter()
        .map(|book| {
            let summary_source = if book.summary.is_empty() {
                &book.description
            } else {
                &book.summary
            };
            CompactCandidate {
                id: &book.id,
                title: &book.title,
                author: &book.author,
                year: &book.year,
                page_count: book.page_count,
                tags: &book.tags[..book.tags.len().min(LIST_MAX_ITEMS)],
                categories: &book.categories[..book.categories.len().min(LIST_MAX_ITEMS)],
                places: &book.places,
                summary: truncate_chars(summary_source, SUMMARY_MAX_CHARS),
            }
        })
        .collect()
}

fn build_instructions(wants_single: bool) -> String {
    let count_rule = if wants_single {
        "exactly 1"
    } else {
        "up to 3"
    };

    format!(
        "You are a well-read guide for a fixed book catalog.\n\
         Your only hard constraint is: recommend ONLY books that exist in CANDIDATES.\n\n\
         Geography behavior:\n\
         - The user's prompt is authoritative.\n\
         - If the user mentions a country, continent, or region, you must satisfy that request.\n\
         - AVAILABLE_COUNTRIES is the set of ISO2 codes that exist in the catalog.\n\
         - Use your world knowledge to map continents and regions to ISO2 codes, then choose only codes present in AVAILABLE_COUNTRIES.\n\
         - Match the user's requested geography primarily using places.override. If override is missing, fall back to setting or author places.\n\
         - selected_iso2 is a UI hint ONLY when the user did not specify a location.\n\
         - If you cannot find any matching book in CANDIDATES for the user's geography constraint, return recommendations as an empty list and explain briefly in assistant_markdown.\n\n\
         Output requirements:\n\
         - assistant_markdown must be prose only (1-3 sentences). No headings, no bullet points, no numbered lists.\n\
         - Each mentioned book must be formatted as: **Title** by Author.\n\
         - Return {} recommendation(s).\n\
         - assistant_markdown must mention ALL recommended books (and only those books).\n\
         - Each recommendations[i].reason must be exactly 1 sentence grounded in metadata.\n\
         - follow_up_questions should usually be empty.\n\
         - actions must be an empty list.\n",
        count_rule
    )
}

fn response_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "assistant_markdown": {"type": "string"},
            "recommendations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "book_id": {"type": "string"},
                        "reason": {"type": "string"}
                    },
                    "required": ["book_id", "reason"]
                }
            },
            "follow_up_questions": {"type": "array", "items": {"type": "string"}},
            "actions": {
                "type": "array",
                "maxItems": 0,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {},
                    "required": []
                }
            }
        },
        "required": [
            "assistant_markdown",
            "recommendations",
            "follow_up_questions",
            "actions"
        ]
    })
}

/// Pull the structured output text out of a provider response and parse it.
///
/// Falls back from the top-level `output_text` convenience field to the
/// first assistant message's output text. Anything unparseable becomes an
/// empty object, never an error.
fn parse_output_text(resp_json: &Value) -> Value {
    if let Some(txt) = resp_json.get("output_text").and_then(Value::as_str) {
        if !txt.trim().is_empty() {
            return serde_json::from_str(txt).unwrap_or_else(|_| json!({}));
        }
    }

    if let Some(items) = resp_json.get("output").and_then(Value::as_array) {
        for item in items {
            let is_assistant_message = item.get("type").and_then(Value::as_str)
                == Some("message")
                && item.get("role").and_then(Value::as_str) == Some("assistant");
            if !is_assistant_message {
                continue;
            }
            let Some(content) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for part in content {
                if part.get("type").and_then(Value::as_str) != Some("output_text") {
                    continue;
                }
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        return serde_json::from_str(text).unwrap_or_else(|_| json!({}));
                    }
                }
            }
        }
    }

    json!({})
}
