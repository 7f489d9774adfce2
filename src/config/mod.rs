use crate::error::{ApiError, Result};
use std::env;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BOOKS_TABLE: &str = "atlas_books";
const DEFAULT_CACHE_TTL_SEC: u64 = 600;
const DEFAULT_BUILD: &str = "book-atlas-2026-08a";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub store_url: String,
    pub store_api_key: String,
    pub store_books_table: String,
    pub openai_api_key: String,
    pub chat_model: String,
    pub cache_ttl: Duration,
    pub debug: bool,
    pub build: String,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// Only `STORE_URL` is required. The provider credential is optional at
    /// startup: requests that need it are rejected per-call with a
    /// machine-readable error code instead of preventing boot.
    pub fn load() -> Result<Self> {
        let store_url = env::var("STORE_URL")
            .map_err(|_| ApiError::ConfigError("STORE_URL must be set".to_string()))?;

        Ok(Config {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            store_url,
            store_api_key: env::var("STORE_API_KEY").unwrap_or_default(),
            store_books_table: env::var("STORE_BOOKS_TABLE")
                .unwrap_or_else(|_| DEFAULT_BOOKS_TABLE.to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            cache_ttl: Duration::from_secs(
                env::var("CHAT_CACHE_TTL_SEC")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CACHE_TTL_SEC),
            ),
            debug: env::var("CHAT_DEBUG").map(|v| v.trim() == "1").unwrap_or(false),
            build: env::var("CHAT_BUILD").unwrap_or_else(|_| DEFAULT_BUILD.to_string()),
        })
    }
}
