use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_cookies::{Cookie, Cookies};
use recordsearch_backend::models::AuthUser;
use recordsearch_backend::ErrorCategory;

use crate::api::{require_user, ApiError, ApiResponse, ApiResult};
use crate::auth::{authenticate, SESSION_COOKIE_NAME};
use crate::state::AppState;
use super::types::*;

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> ApiResult<AuthUser> {
    let ip = addr.ip().to_string();

    // 检查IP是否被封禁
    if state.login_security.is_ip_blocked(&ip) {
        tracing::warn!("Login refused for blocked IP {}", ip);
        return Err(ApiError::new(StatusCode::TOO_MANY_REQUESTS, ErrorCategory::TooManyAttempts));
    }

    let user = authenticate(&state.db, &req.username, &req.password)
        .await
        .map_err(|e| {
            tracing::error!("Login check failed for {}: {}", req.username, e);
            ApiError::internal()
        })?;

    let Some(user) = user else {
        state.login_security.record_failure(&ip);
        tracing::info!("Failed login for {} from {}", req.username, ip);
        return Err(ApiError::unauthorized());
    };

    // 登录成功，清除失败记录
    state.login_security.clear_failure(&ip);

    let token = state.sessions.create(user.clone());
    let mut cookie = Cookie::new(SESSION_COOKIE_NAME, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.add(cookie);

    tracing::info!("Operator {} signed in from {}", user.username, ip);
    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> ApiResult<()> {
    if let Some(cookie) = cookies.get(SESSION_COOKIE_NAME) {
        if let Some(user) = state.sessions.remove(cookie.value()) {
            tracing::info!("Operator {} signed out", user.username);
        }
    }

    // 必须设置相同的 path 才能正确删除 cookie
    let mut removal_cookie = Cookie::new(SESSION_COOKIE_NAME, "");
    removal_cookie.set_path("/");
    cookies.remove(removal_cookie);

    Ok(Json(ApiResponse::success(())))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> ApiResult<AuthUser> {
    let user = require_user(&state, &cookies)?;
    Ok(Json(ApiResponse::success(user)))
}
