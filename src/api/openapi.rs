use utoipa::OpenApi;

use crate::api::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::session,
    ),
    components(schemas(
        health::Health,
        auth::LoginRequest,
        auth::RefreshRequest,
        auth::TokenResponse,
        auth::SessionResponse,
    )),
    tags(
        (name = "auth", description = "Session token issuance and revocation"),
        (name = "health", description = "Service status"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}
