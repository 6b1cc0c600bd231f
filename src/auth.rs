use sqlx::SqlitePool;
use tower_cookies::Cookies;
use recordsearch_backend::models::AuthUser;

use crate::db;
use crate::state::AppState;

pub const SESSION_COOKIE_NAME: &str = "session_token";

/// Verify credentials against the operators table / 校验凭据
///
/// Returns `Ok(None)` for an unknown user, a disabled user or a wrong password.
pub async fn authenticate(pool: &SqlitePool, username: &str, password: &str) -> anyhow::Result<Option<AuthUser>> {
    let Some(operator) = db::find_enabled_operator(pool, username).await? else {
        return Ok(None);
    };

    if !bcrypt::verify(password, &operator.password_hash)? {
        return Ok(None);
    }

    if let Err(e) = db::touch_last_login(pool, &operator.id).await {
        tracing::warn!("Failed to update last login for {}: {}", operator.username, e);
    }
    Ok(Some(AuthUser::from(&operator)))
}

/// Session user from the request cookie, if signed in / 获取当前登录用户
pub fn current_user(state: &AppState, cookies: &Cookies) -> Option<AuthUser> {
    let cookie = cookies.get(SESSION_COOKIE_NAME)?;
    state.sessions.get(cookie.value())
}
