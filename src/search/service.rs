//! Multi-collection search / 多集合搜索
//!
//! Scans the collections of the criteria's kind in registry order, one at a
//! time. Progress is reported after each collection, never per row. A
//! collection whose scan fails with `StoreUnavailable` or times out is
//! skipped and listed in the result; the search itself still succeeds.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::normalize::{normalize_records, normalize_rows, KindRecord};
use crate::error::{RecordError, Result};
use crate::models::{CarRecord, CollectionKind, MatchMode, PersonRecord, Record, SearchCriteria, SearchResult};
use crate::registry::SchemaRegistry;
use crate::store::{Predicate, RecordStore, ScanBatch};

/// Progress callback, called with the completed fraction in [0, 1] / 进度回调
pub type SearchProgress = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Clone, Default)]
pub struct SearchOptions {
    pub progress: Option<SearchProgress>,
    /// Checked before each collection scan; an in-flight scan is never aborted
    pub cancel: Option<CancellationToken>,
}

impl SearchOptions {
    pub fn with_progress(mut self, progress: SearchProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn report(&self, fraction: f64) {
        if let Some(progress) = &self.progress {
            progress(fraction);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct SearchService {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn RecordStore>,
    scan_timeout: Option<Duration>,
}

impl SearchService {
    pub fn new(registry: Arc<SchemaRegistry>, store: Arc<dyn RecordStore>, scan_timeout: Option<Duration>) -> Self {
        Self { registry, store, scan_timeout }
    }

    /// Search every collection of the kind implied by `criteria` / 搜索
    pub async fn search(
        &self,
        query: &str,
        criteria: SearchCriteria,
        options: SearchOptions,
    ) -> Result<SearchResult<Record>> {
        match criteria.kind() {
            CollectionKind::Person => Ok(self
                .run::<PersonRecord>(query, criteria, &options)
                .await?
                .map(Record::from)),
            CollectionKind::Vehicle => Ok(self
                .run::<CarRecord>(query, criteria, &options)
                .await?
                .map(Record::from)),
        }
    }

    /// Read one page of a collection, normalized / 浏览集合
    pub async fn browse(&self, collection: &str, limit: u32, offset: u32) -> Result<Vec<Record>> {
        let target = self.registry.collection(collection)?;
        let rows = self.store.fetch_page(&target.name, limit, offset).await?;
        Ok(normalize_records(target, rows))
    }

    async fn run<T: KindRecord>(
        &self,
        query: &str,
        criteria: SearchCriteria,
        options: &SearchOptions,
    ) -> Result<SearchResult<T>> {
        let started = Instant::now();
        let needle = query.trim();
        if needle.is_empty() {
            return Err(RecordError::InvalidQuery);
        }

        let targets: Vec<_> = self
            .registry
            .resolve_collections(T::KIND)
            .into_iter()
            .filter_map(|c| {
                let fields = c.search_fields(criteria);
                (!fields.is_empty()).then_some((c, fields))
            })
            .collect();

        let mut result = SearchResult::empty();
        if targets.is_empty() {
            tracing::debug!("No {} collections to search for {}", T::KIND, criteria.as_str());
            result.search_time = started.elapsed().as_millis() as u64;
            return Ok(result);
        }

        let total = targets.len();
        options.report(0.0);

        for (done, (collection, fields)) in targets.into_iter().enumerate() {
            if options.is_cancelled() {
                tracing::info!(
                    "Search cancelled after {}/{} collections",
                    done, total
                );
                result.cancelled = true;
                break;
            }

            let predicate = match criteria.match_mode() {
                MatchMode::Equals => Predicate::equals(fields, needle),
                MatchMode::ContainsCaseInsensitive => Predicate::contains(fields, needle),
            };

            match self.scan_bounded(&collection.name, &predicate).await {
                Ok(batch) => {
                    result.total_scanned += batch.examined.max(batch.rows.len() as u64);
                    if batch.truncated {
                        tracing::info!(
                            "Collection {} matched more than {} rows, result cut off",
                            collection.name, batch.rows.len()
                        );
                        result.truncated_collections.push(collection.name.clone());
                    }
                    result.results.extend(normalize_rows::<T>(collection, batch.rows));
                }
                Err(RecordError::StoreUnavailable { reason }) => {
                    tracing::warn!("Skipping collection {} in search: {}", collection.name, reason);
                    result.skipped_collections.push(collection.name.clone());
                }
                Err(e) => return Err(e),
            }

            options.report((done + 1) as f64 / total as f64);
        }

        result.search_time = started.elapsed().as_millis() as u64;
        tracing::debug!(
            "Search {} {:?}: {} results, {} scanned, {} skipped, {}ms",
            criteria.as_str(), needle, result.results.len(), result.total_scanned,
            result.skipped_collections.len(), result.search_time
        );
        Ok(result)
    }

    /// One collection scan under the per-collection timeout / 带超时的单集合扫描
    async fn scan_bounded(&self, collection: &str, predicate: &Predicate) -> Result<ScanBatch> {
        match self.scan_timeout {
            Some(limit) => tokio::time::timeout(limit, self.store.scan(collection, predicate))
                .await
                .map_err(|_| RecordError::store_unavailable(format!("scan timed out after {:?}", limit)))?,
            None => self.store.scan(collection, predicate).await,
        }
    }
}
