pub mod book;
pub mod chat;

pub use book::{BookRecord, Iso2Sets, Place, Places, StoreDocument};
pub use chat::{ChatContext, ChatEnvelope, ChatMessage, ChatRequest, Recommendation};
