use actix_web::{get, route, HttpResponse};

#[get("/health")]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[route("/health", method = "OPTIONS")]
pub async fn health_options() -> HttpResponse {
    HttpResponse::NoContent().finish()
}
