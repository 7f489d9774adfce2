use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One turn of client-supplied conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn deserialize_messages<'de, D>(deserializer: D) -> Result<Vec<ChatMessage>, D::Error>
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
        // Entries that are not {role, content} objects are dropped rather
        // than failing the whole request.
        Loose::List(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        Loose::Other(_) => Vec::new(),
    })
}

fn deserialize_lenient_context<'de, D>(deserializer: D) -> Result<ChatContext, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Context(ChatContext),
        Other(Value),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Context(ctx) => ctx,
        Loose::Other(_) => ChatContext::default(),
    })
}

fn deserialize_lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Bool(bool),
        Other(Value),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Bool(b) => b,
        Loose::Other(_) => false,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatContext {
    #[serde(default)]
    pub selected_iso2: Option<String>,
}

/// Request body for the chat endpoint.
///
/// Wrong-typed top-level fields degrade to their defaults instead of
/// rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default, deserialize_with = "deserialize_lenient_bool")]
    pub debug: bool,
    #[serde(default, deserialize_with = "deserialize_lenient_context")]
    pub context: ChatContext,
    #[serde(default, deserialize_with = "deserialize_messages")]
    pub messages: Vec<ChatMessage>,
}

/// A validated recommendation pointing at an existing catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub book_id: String,
    pub reason: String,
}

/// The fixed-shape response returned to the caller on every success path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEnvelope {
    pub assistant_markdown: String,
    pub recommendations: Vec<Recommendation>,
    pub follow_up_questions: Vec<String>,
    // Reserved capability, always empty for now.
    pub actions: Vec<Value>,
    pub build: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
}
