pub mod auth;
pub mod health;

pub use self::health::health;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

// fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not found" })),
    )
}
