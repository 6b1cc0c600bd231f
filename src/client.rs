//! HTTP client facade for UI/CLI callers / HTTP 客户端门面
//!
//! Only marshals requests and responses. Sessions ride on the cookie store,
//! so one client instance is one signed-in operator.

use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::ErrorCategory;
use crate::models::{AuthUser, CollectionSummary, Record, SearchCriteria, SearchResult};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server refused the call; `message` is safe to show to users
    #[error("{message}")]
    Rejected { category: ErrorCategory, message: String },
}

impl ClientError {
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Rejected { category, .. } => Some(*category),
            _ => None,
        }
    }
}

/// Server response envelope / 响应包装
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    message: String,
    data: Option<T>,
    error: Option<ErrorCategory>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    criteria: SearchCriteria,
}

#[derive(Serialize)]
struct InsertBody<'a> {
    fields: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Inserted {
    inserted_id: i64,
}

#[derive(Clone)]
pub struct RecordClient {
    http: Client,
    base_url: Url,
}

impl RecordClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self { http, base_url })
    }

    /// Build a URL from path segments; each segment is percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn call<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope<T> = response.json().await?;
        match (envelope.error, envelope.data) {
            (None, Some(data)) if status.is_success() => Ok(data),
            (category, _) => Err(ClientError::Rejected {
                category: category.unwrap_or(ErrorCategory::Internal),
                message: envelope.message,
            }),
        }
    }

    /// Sign in; `Ok(false)` means the credentials were wrong / 登录
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<bool, ClientError> {
        let url = self.endpoint(&["api", "auth", "login"]);
        let body = LoginBody { username, password };
        match self.call::<AuthUser, _>(Method::POST, url, Some(&body)).await {
            Ok(user) => {
                tracing::debug!("Signed in as {} ({})", user.username, user.role);
                Ok(true)
            }
            Err(ClientError::Rejected { category: ErrorCategory::Unauthorized, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn current_user(&self) -> Result<AuthUser, ClientError> {
        let url = self.endpoint(&["api", "auth", "me"]);
        self.call::<_, ()>(Method::GET, url, None).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let url = self.endpoint(&["api", "auth", "logout"]);
        let response = self.http.post(url).send().await?;
        if response.status() != StatusCode::OK {
            tracing::warn!("Logout returned {}", response.status());
        }
        Ok(())
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>, ClientError> {
        let url = self.endpoint(&["api", "collections"]);
        self.call::<_, ()>(Method::GET, url, None).await
    }

    pub async fn search(&self, query: &str, criteria: SearchCriteria) -> Result<SearchResult<Record>, ClientError> {
        let url = self.endpoint(&["api", "search"]);
        self.call(Method::POST, url, Some(&SearchBody { query, criteria })).await
    }

    pub async fn insert(&self, collection: &str, fields: &BTreeMap<String, String>) -> Result<i64, ClientError> {
        let url = self.endpoint(&["api", "collections", collection, "records"]);
        let inserted: Inserted = self.call(Method::POST, url, Some(&InsertBody { fields })).await?;
        Ok(inserted.inserted_id)
    }

    pub async fn browse(&self, collection: &str, limit: u32, offset: u32) -> Result<Vec<Record>, ClientError> {
        let mut url = self.endpoint(&["api", "collections", collection, "records"]);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.call::<_, ()>(Method::GET, url, None).await
    }
}
