use crate::config::Config;
use crate::models::{ChatEnvelope, ChatMessage, ChatRequest};
use crate::services::catalog::CatalogCache;
use crate::services::recommender::OpenAiClient;
use crate::services::validator::{self, PROMPT_MESSAGE};
use actix_web::{http::Method, web, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

const ERROR_MESSAGE: &str = "Sorry — something went wrong talking to the book brain. Try \
     again in a sec.";
const HISTORY_TURNS: usize = 12;
const DEBUG_ERROR_MAX_CHARS: usize = 1800;

/// Everything the chat endpoint needs, wired once at startup.
pub struct ChatState {
    pub catalog: Arc<CatalogCache>,
    pub openai: Option<OpenAiClient>,
    pub config: Config,
}

pub fn chat_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/chat")
            .route(web::post().to(chat))
            .route(web::route().method(Method::OPTIONS).to(chat_preflight))
            .route(web::route().to(method_not_allowed)),
    );
}

async fn chat_preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({"error": "method_not_allowed"}))
}

fn prompt_envelope(build: &str) -> ChatEnvelope {
    ChatEnvelope {
        assistant_markdown: PROMPT_MESSAGE.to_string(),
        recommendations: Vec::new(),
        follow_up_questions: Vec::new(),
        actions: Vec::new(),
        build: build.to_string(),
        debug: None,
    }
}

/// The chat endpoint.
///
/// Only configuration problems (empty catalog, missing credential) surface
/// as HTTP errors; provider failures are absorbed into a 200 apology
/// envelope so the chat UI always has something to render.
async fn chat(state: web::Data<ChatState>, body: web::Json<ChatRequest>) -> HttpResponse {
    let config = &state.config;
    let debug = body.debug || config.debug;

    let selected_iso2 = body
        .context
        .selected_iso2
        .as_deref()
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()));

    let last_user_text = body
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user" && !m.content.trim().is_empty())
        .map(|m| m.content.trim().to_string())
        .unwrap_or_default();

    if last_user_text.is_empty() {
        return HttpResponse::Ok().json(prompt_envelope(&config.build));
    }

    let snapshot = state.catalog.get().await;
    if snapshot.books.is_empty() {
        let mut out = json!({"error": "catalog_unavailable", "build": &config.build});
        if debug {
            out["debug"] = json!({
                "build": &config.build,
                "books_table": &config.store_books_table,
            });
        }
        return HttpResponse::InternalServerError().json(out);
    }

    let Some(openai) = state.openai.as_ref() else {
        let mut out = json!({"error": "missing_openai_api_key", "build": &config.build});
        if debug {
            out["debug"] = json!({"build": &config.build});
        }
        return HttpResponse::InternalServerError().json(out);
    };

    let start = body.messages.len().saturating_sub(HISTORY_TURNS);
    let history: Vec<ChatMessage> = body.messages[start..]
        .iter()
        .filter_map(|m| {
            let role = m.role.trim().to_lowercase();
            let content = m.content.trim();
            if (role == "user" || role == "assistant") && !content.is_empty() {
                Some(ChatMessage {
                    role,
                    content: content.to_string(),
                })
            } else {
                None
            }
        })
        .collect();

    let result = openai
        .request(
            &history,
            &last_user_text,
            selected_iso2.as_deref(),
            &snapshot.available_countries,
            &snapshot.books,
        )
        .await;

    match result {
        Ok(parsed) => {
            let mut envelope =
                validator::validate(&parsed, &snapshot, &last_user_text, &config.build);
            if debug {
                envelope.debug = Some(json!({
                    "candidates": snapshot.books.len(),
                    "catalog_total": snapshot.books.len(),
                    "countries": snapshot.available_countries.len(),
                    "selected_iso2": &selected_iso2,
                    "model": &config.chat_model,
                    "build": &config.build,
                }));
            }
            HttpResponse::Ok().json(envelope)
        }
        Err(e) => {
            error!("chat recommendation failed: {}", e);

            let mut envelope = ChatEnvelope {
                assistant_markdown: ERROR_MESSAGE.to_string(),
                recommendations: Vec::new(),
                follow_up_questions: Vec::new(),
                actions: Vec::new(),
                build: config.build.clone(),
                debug: None,
            };
            if debug {
                envelope.debug = Some(json!({
                    "error": validator::truncate_chars(&e.to_string(), DEBUG_ERROR_MAX_CHARS),
                    "trace": format!("{:?}", e),
                    "model": &config.chat_model,
                    "selected_iso2": &selected_iso2,
                    "build": &config.build,
                }));
            }
            HttpResponse::Ok().json(envelope)
        }
    }
}
