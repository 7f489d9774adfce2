use actix_web::{web, Scope};

use crate::handlers::{chat_config, health_check, health_options};

/// Configure all routes for the API
pub fn api_routes() -> Scope {
    web::scope("/api")
        .service(health_check)
        .service(health_options)
        .configure(chat_config)
}
