//! Record store adapter - the only layer that talks to persistent storage / 记录存储适配层
//!
//! Callers pass collection names that already passed the schema registry;
//! implementations re-check the identifier pattern and fail closed with
//! `InvalidIdentifier`. Values always travel as bound parameters.
//!
//! Case-insensitive matching folds ASCII letters only; `É` and `é` are
//! different characters to every adapter.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{MatchMode, RawRow};

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

/// Row filter for a scan; `fields` are ORed / 扫描谓词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub mode: MatchMode,
    pub fields: Vec<String>,
    pub value: String,
}

impl Predicate {
    pub fn equals(fields: Vec<String>, value: impl Into<String>) -> Self {
        Self { mode: MatchMode::Equals, fields, value: value.into() }
    }

    pub fn contains(fields: Vec<String>, needle: impl Into<String>) -> Self {
        Self { mode: MatchMode::ContainsCaseInsensitive, fields, value: needle.into() }
    }
}

/// Rows produced by one collection scan / 单集合扫描结果
#[derive(Debug, Clone, Default)]
pub struct ScanBatch {
    /// Rows examined by the scan, matched or not / 扫描过的行数
    pub examined: u64,
    pub rows: Vec<RawRow>,
    /// More rows matched than the adapter's row cap returned / 结果被截断
    pub truncated: bool,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Matching rows of one collection ordered by id / 扫描集合
    async fn scan(&self, collection: &str, predicate: &Predicate) -> Result<ScanBatch>;

    /// Write one row atomically, returning the assigned id / 插入一行
    async fn insert_one(&self, collection: &str, values: &BTreeMap<String, String>) -> Result<i64>;

    /// Unfiltered page of rows ordered by id / 分页读取
    async fn fetch_page(&self, collection: &str, limit: u32, offset: u32) -> Result<Vec<RawRow>>;
}
