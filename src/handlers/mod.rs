pub mod chat;
pub mod health;

pub use chat::{chat_config, ChatState};
pub use health::{health_check, health_options};
