pub mod auth;
pub mod collections;
pub mod search;
pub mod server;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_cookies::{CookieManagerLayer, Cookies};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use recordsearch_backend::models::AuthUser;
use recordsearch_backend::{ErrorCategory, RecordError};

use crate::state::AppState;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCategory>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn error(status: StatusCode, category: ErrorCategory) -> Self {
        Self {
            code: status.as_u16() as i32,
            message: category.user_message().to_string(),
            data: None,
            error: Some(category),
        }
    }
}

/// Failed API call: one status and one user-facing message per category / API错误
#[derive(Debug, Clone, Copy)]
pub struct ApiError {
    pub status: StatusCode,
    pub category: ErrorCategory,
}

impl ApiError {
    pub fn new(status: StatusCode, category: ErrorCategory) -> Self {
        Self { status, category }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorCategory::Unauthorized)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCategory::Internal)
    }
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        let status = match &err {
            RecordError::InvalidQuery
            | RecordError::DisallowedField { .. }
            | RecordError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            RecordError::UnknownCollection(_) => StatusCode::NOT_FOUND,
            RecordError::ConstraintViolation { .. } => StatusCode::CONFLICT,
            RecordError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        if !err.is_validation() {
            tracing::warn!("Record operation failed: {}", err);
        }
        Self::new(status, err.category())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.status, self.category))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Session user or 401 / 需要登录
pub fn require_user(state: &AppState, cookies: &Cookies) -> Result<AuthUser, ApiError> {
    crate::auth::current_user(state, cookies).ok_or_else(ApiError::unauthorized)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(server::health_check))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/collections", get(collections::list_collections))
        .route(
            "/api/collections/:name/records",
            get(collections::browse_records).post(collections::insert_record),
        )
        .route("/api/search", post(search::search))
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordsearch_backend::client::{ClientError, RecordClient};
    use recordsearch_backend::config::{AppConfig, CollectionConfig};
    use recordsearch_backend::models::{CollectionKind, Record, SearchCriteria};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::BTreeMap;
    use std::net::SocketAddr;

    async fn spawn_app(collections: Vec<CollectionConfig>) -> String {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        crate::db::create_operator(&pool, "sara", "correct horse", "Sara K", "operator", 4)
            .await
            .unwrap();

        let config = AppConfig { collections, ..AppConfig::default() };
        let state = Arc::new(AppState::new(pool, &config).await.unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });
        format!("http://{}", addr)
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_requires_session() {
        let base = spawn_app(AppConfig::default().collections).await;
        let client = RecordClient::new(&base).unwrap();

        let err = client.list_collections().await.unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::Unauthorized));
        let err = client.search("ahmed", SearchCriteria::Name).await.unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::Unauthorized));

        assert!(!client.authenticate("sara", "wrong").await.unwrap());
        assert!(!client.authenticate("nobody", "correct horse").await.unwrap());
        assert!(client.authenticate("sara", "correct horse").await.unwrap());

        let me = client.current_user().await.unwrap();
        assert_eq!(me.username, "sara");
        assert_eq!(me.full_name, "Sara K");

        client.logout().await.unwrap();
        let err = client.current_user().await.unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::Unauthorized));
    }

    #[tokio::test]
    async fn test_insert_search_browse_round_trip() {
        let base = spawn_app(AppConfig::default().collections).await;
        let client = RecordClient::new(&base).unwrap();
        assert!(client.authenticate("sara", "correct horse").await.unwrap());

        let collections = client.list_collections().await.unwrap();
        let names: Vec<_> = collections.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert_eq!(names, vec![("people", CollectionKind::Person), ("cars", CollectionKind::Vehicle)]);

        let id = client
            .insert("cars", &fields(&[("plate", "12-3456"), ("model", "Toyota"), ("owner_name", "Sara")]))
            .await
            .unwrap();
        assert!(id > 0);
        let err = client
            .insert("cars", &fields(&[("plate", "12-3456"), ("model", "Honda")]))
            .await
            .unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::ConstraintViolation));
        assert!(!err.to_string().contains("UNIQUE"));

        client
            .insert("people", &fields(&[("name", "Ahmed Ali"), ("dial", "0791234567"), ("national_id", "9871")]))
            .await
            .unwrap();

        let result = client.search("toyota", SearchCriteria::Model).await.unwrap();
        assert_eq!(result.results.len(), 1);
        match &result.results[0] {
            Record::Vehicle(car) => {
                assert_eq!(car.id, id);
                assert_eq!(car.owner_name.as_deref(), Some("Sara"));
            }
            other => panic!("expected vehicle, got {:?}", other),
        }

        let result = client.search("0791234567", SearchCriteria::Phone).await.unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.total_scanned, 1);
        match &result.results[0] {
            Record::Person(p) => assert_eq!(p.national_id.as_deref(), Some("9871")),
            other => panic!("expected person, got {:?}", other),
        }

        let rows = client.browse("cars", 10, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].collection(), "cars");
    }

    #[tokio::test]
    async fn test_rejections_carry_category() {
        let base = spawn_app(AppConfig::default().collections).await;
        let client = RecordClient::new(&base).unwrap();
        assert!(client.authenticate("sara", "correct horse").await.unwrap());

        let err = client.search("   ", SearchCriteria::Name).await.unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::InvalidQuery));

        let err = client.insert("cars; DROP TABLE cars", &fields(&[("plate", "x")])).await.unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::InvalidIdentifier));

        let err = client.insert("trucks", &fields(&[("plate", "x")])).await.unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::UnknownCollection));

        let err = client
            .insert("cars", &fields(&[("plate", "x"), ("model", "y"), ("price", "9")]))
            .await
            .unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::DisallowedField));
        match err {
            ClientError::Rejected { message, .. } => {
                assert_eq!(message, ErrorCategory::DisallowedField.user_message())
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        let err = client.browse("people-2", 10, 0).await.unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::InvalidIdentifier));
    }

    #[tokio::test]
    async fn test_search_across_custom_collections() {
        let collections = vec![
            CollectionConfig {
                name: "people_a".into(),
                kind: CollectionKind::Person,
                fields: vec!["name".into(), "dial".into()],
                unique: Vec::new(),
            },
            CollectionConfig {
                name: "people_b".into(),
                kind: CollectionKind::Person,
                fields: vec!["name".into(), "dial".into(), "dial2".into()],
                unique: Vec::new(),
            },
        ];
        let base = spawn_app(collections).await;
        let client = RecordClient::new(&base).unwrap();
        assert!(client.authenticate("sara", "correct horse").await.unwrap());

        client.insert("people_a", &fields(&[("name", "Ahmed"), ("dial", "0790000000")])).await.unwrap();
        client
            .insert("people_b", &fields(&[("name", "Omar"), ("dial", "0780000000"), ("dial2", "0790000000")]))
            .await
            .unwrap();

        let first = client.search("0790000000", SearchCriteria::Phone).await.unwrap();
        let second = client.search("0790000000", SearchCriteria::Phone).await.unwrap();
        let hits: Vec<_> = first.results.iter().map(|r| r.collection().to_string()).collect();
        assert_eq!(hits, vec!["people_a", "people_b"]);
        assert_eq!(first.results, second.results);
        assert!(first.skipped_collections.is_empty());
        assert!(first.truncated_collections.is_empty());
    }

    #[tokio::test]
    async fn test_login_throttled_after_failures() {
        let base = spawn_app(AppConfig::default().collections).await;
        let client = RecordClient::new(&base).unwrap();
        for _ in 0..5 {
            assert!(!client.authenticate("sara", "guess").await.unwrap());
        }
        let err = client.authenticate("sara", "correct horse").await.unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::TooManyAttempts));
    }

    #[tokio::test]
    async fn test_health_needs_no_session() {
        let base = spawn_app(AppConfig::default().collections).await;
        let body: serde_json::Value = reqwest::get(format!("{}/api/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["build_time"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[test]
    fn test_record_error_status_mapping() {
        let cases = [
            (RecordError::InvalidQuery, StatusCode::BAD_REQUEST),
            (RecordError::UnknownCollection("x".into()), StatusCode::NOT_FOUND),
            (RecordError::constraint_violation("dup"), StatusCode::CONFLICT),
            (RecordError::store_unavailable("down"), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
