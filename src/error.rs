//! Record service error taxonomy / 记录服务错误分类
//!
//! Validation errors are raised before any store I/O. Store errors keep
//! the backend text in `reason` for logs only; the user-visible message
//! comes from [`ErrorCategory::user_message`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecordError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Empty or whitespace-only search query / 空查询
    #[error("search query must not be empty")]
    InvalidQuery,

    /// Collection name not present in the registry / 集合不存在
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// Field not declared for the collection / 字段不允许
    #[error("field `{field}` is not allowed in collection `{collection}`")]
    DisallowedField { collection: String, field: String },

    /// Identifier failed the `[A-Za-z0-9_]{1,64}` pattern / 非法标识符
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Connection, pool or transport failure / 存储不可用
    #[error("record store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// Uniqueness / not-null / check failure on write / 约束冲突
    #[error("constraint violation: {reason}")]
    ConstraintViolation { reason: String },
}

impl RecordError {
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable { reason: reason.into() }
    }

    pub fn constraint_violation(reason: impl Into<String>) -> Self {
        Self::ConstraintViolation { reason: reason.into() }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidQuery => ErrorCategory::InvalidQuery,
            Self::UnknownCollection(_) => ErrorCategory::UnknownCollection,
            Self::DisallowedField { .. } => ErrorCategory::DisallowedField,
            Self::InvalidIdentifier(_) => ErrorCategory::InvalidIdentifier,
            Self::StoreUnavailable { .. } => ErrorCategory::StoreUnavailable,
            Self::ConstraintViolation { .. } => ErrorCategory::ConstraintViolation,
        }
    }

    /// True for errors detected before touching the store / 是否为校验错误
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery
                | Self::UnknownCollection(_)
                | Self::DisallowedField { .. }
                | Self::InvalidIdentifier(_)
        )
    }
}

impl From<sqlx::Error> for RecordError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation => {
                    return Self::constraint_violation(db_err.message());
                }
                _ => {}
            }
        }
        Self::store_unavailable(err.to_string())
    }
}

/// Failure category shared by the HTTP envelope and the client / 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidQuery,
    UnknownCollection,
    DisallowedField,
    InvalidIdentifier,
    StoreUnavailable,
    ConstraintViolation,
    Unauthorized,
    TooManyAttempts,
    Internal,
}

impl ErrorCategory {
    /// One human-readable message per category / 每个类别一条用户可读消息
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidQuery => "Enter a search term",
            Self::UnknownCollection => "That record set does not exist",
            Self::DisallowedField => "The record contains a field this record set does not accept",
            Self::InvalidIdentifier => "Record set names may only contain letters, digits and underscores",
            Self::StoreUnavailable => "The record store is unavailable, try again later",
            Self::ConstraintViolation => "The record conflicts with an existing record or is missing a required value",
            Self::Unauthorized => "Sign in to continue",
            Self::TooManyAttempts => "Too many failed sign-in attempts, try again in 30 minutes",
            Self::Internal => "Something went wrong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(RecordError::InvalidQuery.category(), ErrorCategory::InvalidQuery);
        assert_eq!(
            RecordError::constraint_violation("UNIQUE constraint failed: cars.plate").category(),
            ErrorCategory::ConstraintViolation
        );
        assert!(RecordError::InvalidIdentifier("a-b".into()).is_validation());
        assert!(!RecordError::store_unavailable("closed").is_validation());
    }

    #[test]
    fn test_user_message_hides_backend_text() {
        let err = RecordError::constraint_violation("UNIQUE constraint failed: cars.plate");
        assert!(!err.category().user_message().contains("UNIQUE"));
    }

    #[test]
    fn test_pool_closed_maps_to_store_unavailable() {
        let err: RecordError = sqlx::Error::PoolClosed.into();
        assert_eq!(err.category(), ErrorCategory::StoreUnavailable);
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::StoreUnavailable).unwrap();
        assert_eq!(json, "\"store_unavailable\"");
    }
}
