//! SQLite record store / SQLite 记录存储
//!
//! One table per collection, table name = collection name. Identifiers are
//! validated and double-quoted before they are placed in query text; all
//! values are bound.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use super::{Predicate, RecordStore, ScanBatch};
use crate::config::DatabaseConfig;
use crate::error::{RecordError, Result};
use crate::models::{MatchMode, RawRow, SearchCriteria};
use crate::registry::{check_identifier, Collection, ID_FIELD};

/// Validate and quote an identifier for query text / 校验并引用标识符
fn quoted(ident: &str) -> Result<String> {
    check_identifier(ident)?;
    Ok(format!("\"{}\"", ident))
}

/// Escape LIKE wildcards so the needle matches literally / 转义LIKE通配符
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Build the WHERE clause for a predicate, or None when it has no fields
fn where_clause(predicate: &Predicate) -> Result<Option<String>> {
    if predicate.fields.is_empty() {
        return Ok(None);
    }
    let mut terms = Vec::with_capacity(predicate.fields.len());
    for field in &predicate.fields {
        let column = quoted(field)?;
        terms.push(match predicate.mode {
            MatchMode::Equals => format!("{} = ?", column),
            MatchMode::ContainsCaseInsensitive => format!(r"lower({}) LIKE lower(?) ESCAPE '\'", column),
        });
    }
    Ok(Some(terms.join(" OR ")))
}

/// Quoted name for an index derived from a table and column / 索引名
///
/// Both parts are validated identifiers, so the result only holds
/// `[A-Za-z0-9_]`; it may run past the 64-character limit that applies to
/// caller-supplied names.
fn index_name(prefix: &str, table: &str, field: &str) -> Result<String> {
    check_identifier(table)?;
    check_identifier(field)?;
    Ok(format!("\"{}_{}_{}\"", prefix, table, field))
}

fn decode_row(row: &SqliteRow) -> Result<RawRow> {
    let mut out = RawRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            continue;
        }
        let type_name = raw.type_info().name().to_string();
        let value = match type_name.as_str() {
            "INTEGER" => row.try_get::<i64, _>(idx)?.to_string(),
            "REAL" => row.try_get::<f64, _>(idx)?.to_string(),
            "BLOB" => continue,
            _ => row.try_get::<String, _>(idx)?,
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    max_rows: u32,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool, max_rows: u32) -> Self {
        Self { pool, max_rows: max_rows.max(1) }
    }

    /// Open a bounded pool; callers queue for up to `acquire_timeout_secs` / 创建连接池
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Record database opened: {} (WAL mode, {} connections)",
            database_url, config.max_connections
        );
        Ok(pool)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the collection's table, or add the declared columns an older table lacks / 创建或补齐集合表
    ///
    /// Columns added to an existing table are plain `TEXT`: SQLite cannot add
    /// `NOT NULL` or `UNIQUE` columns in place, so uniqueness comes from an
    /// index and required values are checked by the insert service.
    pub async fn ensure_collection(&self, collection: &Collection) -> Result<()> {
        let table = quoted(&collection.name)?;
        let mut columns = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quoted(ID_FIELD)?)];
        for field in &collection.fields {
            let mut column = format!("{} TEXT", quoted(field)?);
            if collection.is_required(field) {
                column.push_str(" NOT NULL");
            }
            if collection.unique.contains(field) {
                column.push_str(" UNIQUE");
            }
            columns.push(column);
        }

        let sql = format!("CREATE TABLE IF NOT EXISTS {} ({})", table, columns.join(", "));
        sqlx::query(&sql).execute(&self.pool).await?;

        let existing: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
            .bind(&collection.name)
            .fetch_all(&self.pool)
            .await?;
        for field in &collection.fields {
            if existing.iter().any(|c| c.eq_ignore_ascii_case(field)) {
                continue;
            }
            let sql = format!("ALTER TABLE {} ADD COLUMN {} TEXT", table, quoted(field)?);
            sqlx::query(&sql).execute(&self.pool).await?;
            tracing::info!("Added column {} to collection {}", field, collection.name);

            if collection.unique.contains(field) {
                let sql = format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                    index_name("uq", &collection.name, field)?, table, quoted(field)?
                );
                sqlx::query(&sql).execute(&self.pool).await?;
            }
        }

        // Exact-match lookups get an index unless UNIQUE already provides one
        for field in collection.search_fields(SearchCriteria::Plate) {
            if collection.unique.contains(&field) {
                continue;
            }
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                index_name("idx", &collection.name, &field)?, table, quoted(&field)?
            );
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        tracing::debug!("Collection table ready: {}", collection.name);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn scan(&self, collection: &str, predicate: &Predicate) -> Result<ScanBatch> {
        let table = quoted(collection)?;
        let filter = where_clause(predicate)?;

        let (examined,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;

        let Some(filter) = filter else {
            return Ok(ScanBatch { examined: examined as u64, rows: Vec::new(), truncated: false });
        };

        let sql = format!(
            "SELECT * FROM {} WHERE {} ORDER BY {} LIMIT ?",
            table, filter, quoted(ID_FIELD)?
        );
        let bound = match predicate.mode {
            MatchMode::Equals => predicate.value.clone(),
            MatchMode::ContainsCaseInsensitive => like_pattern(&predicate.value),
        };
        let mut query = sqlx::query(&sql);
        for _ in &predicate.fields {
            query = query.bind(bound.clone());
        }
        // One row past the cap tells a full result from a cut-off one
        let mut rows = query
            .bind(self.max_rows as i64 + 1)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()?;
        let truncated = rows.len() > self.max_rows as usize;
        rows.truncate(self.max_rows as usize);

        tracing::debug!(
            "Scanned {}: {} examined, {} matched ({:?} on {:?})",
            collection, examined, rows.len(), predicate.mode, predicate.fields
        );
        Ok(ScanBatch { examined: examined as u64, rows, truncated })
    }

    async fn insert_one(&self, collection: &str, values: &BTreeMap<String, String>) -> Result<i64> {
        let table = quoted(collection)?;
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let columns = values
                .keys()
                .map(|k| quoted(k))
                .collect::<Result<Vec<_>>>()?;
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!("INSERT INTO {} ({}) VALUES ({})", table, columns.join(", "), placeholders)
        };

        let mut query = sqlx::query(&sql);
        for value in values.values() {
            query = query.bind(value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    async fn fetch_page(&self, collection: &str, limit: u32, offset: u32) -> Result<Vec<RawRow>> {
        let table = quoted(collection)?;
        let sql = format!("SELECT * FROM {} ORDER BY {} LIMIT ? OFFSET ?", table, quoted(ID_FIELD)?);
        sqlx::query(&sql)
            .bind(limit.min(self.max_rows) as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(decode_row)
            .collect()
    }
}
