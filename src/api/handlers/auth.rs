//! Login, refresh, logout and session endpoints.
//!
//! Handlers only parse input and map results; every decision is made by
//! [`Authenticator`]. Rejections go through [`AuthError`]'s response mapping,
//! which collapses them into one generic 401.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    auth::{AuthError, Authenticator, Deadline, TokenPair},
    rate_limit::client_key,
};

const REQUEST_DEADLINE: Duration = Duration::from_secs(10);
const TOKEN_TYPE: &str = "Bearer";

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl std::fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRequest").finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: TOKEN_TYPE.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub account_id: i64,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

fn bad_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid request" })),
    )
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Credentials accepted", body = TokenResponse, content_type = "application/json"),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Credentials rejected"),
        (status = 429, description = "Too many requests"),
    ),
    tag = "auth"
)]
#[instrument(skip(auth, headers, payload))]
pub async fn login(
    auth: Extension<Arc<Authenticator>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request();
    };
    if request.username.trim().is_empty() || request.password.is_empty() {
        return bad_request();
    }

    let origin = client_key(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    match auth
        .authenticate(
            &request.username,
            &request.password,
            &origin,
            Deadline::after(REQUEST_DEADLINE),
        )
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 200, description = "New token pair", body = TokenResponse, content_type = "application/json"),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Refresh token rejected"),
    ),
    tag = "auth"
)]
#[instrument(skip(auth, payload))]
pub async fn refresh(
    auth: Extension<Arc<Authenticator>>,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request();
    };

    match auth
        .refresh(&request.refresh_token, Deadline::after(REQUEST_DEADLINE))
        .await
    {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    params (
        ("Authorization" = String, Header, description = "Bearer access token"),
    ),
    responses (
        (status = 204, description = "Access token revoked"),
        (status = 401, description = "Access token rejected"),
    ),
    tag = "auth"
)]
#[instrument(skip(auth, headers))]
pub async fn logout(auth: Extension<Arc<Authenticator>>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::TokenMalformed.into_response();
    };

    match auth.invalidate(token, Deadline::after(REQUEST_DEADLINE)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    params (
        ("Authorization" = String, Header, description = "Bearer access token"),
    ),
    responses (
        (status = 200, description = "Access token is valid", body = SessionResponse, content_type = "application/json"),
        (status = 401, description = "Access token rejected"),
    ),
    tag = "auth"
)]
#[instrument(skip(auth, headers))]
pub async fn session(auth: Extension<Arc<Authenticator>>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::TokenMalformed.into_response();
    };

    match auth
        .authorize(token, Deadline::after(REQUEST_DEADLINE))
        .await
    {
        Ok(session) => Json(SessionResponse {
            account_id: session.account.id,
            username: session.account.username,
            expires_at: session.claims.expires_at(),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer a.b.c"));
        assert_eq!(bearer_token(&headers), Some("a.b.c"));
    }

    #[test]
    fn login_request_debug_hides_password() {
        let request = LoginRequest {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{request:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
