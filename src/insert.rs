//! Validated record insert / 记录写入
//!
//! Nothing reaches the store until the collection and every field key have
//! passed the registry and every required field holds a non-blank value.
//! Failed writes are never retried.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{RecordError, Result};
use crate::registry::SchemaRegistry;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct InsertService {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn RecordStore>,
}

impl InsertService {
    pub fn new(registry: Arc<SchemaRegistry>, store: Arc<dyn RecordStore>) -> Self {
        Self { registry, store }
    }

    /// Insert one record, returning the store-assigned id / 插入记录
    pub async fn insert(&self, collection: &str, fields: &BTreeMap<String, String>) -> Result<i64> {
        let target = self
            .registry
            .validate_field_set(collection, fields.keys().map(String::as_str))?;

        // A blank required value would be stored but never normalize into a record
        for required in target.kind.required_fields() {
            let present = fields.get(*required).is_some_and(|v| !v.trim().is_empty());
            if !present {
                return Err(RecordError::constraint_violation(format!(
                    "{}.{} is required and must not be blank",
                    target.name, required
                )));
            }
        }

        match self.store.insert_one(&target.name, fields).await {
            Ok(id) => {
                tracing::info!("Inserted record {} into {}", id, target.name);
                Ok(id)
            }
            Err(e) => {
                tracing::warn!("Insert into {} failed: {}", target.name, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollectionKind;
    use crate::registry::tests::collection_config;
    use crate::search::service::tests::FakeStore;
    use crate::store::sqlite::tests::memory_store;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(
            SchemaRegistry::from_config(&[
                collection_config("people_a", CollectionKind::Person, &["name", "dial"], &[]),
                collection_config("cars", CollectionKind::Vehicle, &["plate", "model", "color"], &["plate"]),
            ])
            .unwrap(),
        )
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_insert_then_duplicate_plate() {
        let registry = registry();
        let service = InsertService::new(registry.clone(), Arc::new(memory_store(&registry).await));

        let id = service
            .insert("cars", &fields(&[("plate", "12-3456"), ("model", "Toyota")]))
            .await
            .unwrap();
        assert!(id > 0);

        let err = service
            .insert("cars", &fields(&[("plate", "12-3456"), ("model", "Honda")]))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::ConstraintViolation { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_validation_happens_before_store() {
        let store = Arc::new(FakeStore::default());
        let service = InsertService::new(registry(), store.clone());

        let err = service.insert("cars; DROP TABLE cars", &fields(&[("plate", "x")])).await.unwrap_err();
        assert!(matches!(err, RecordError::InvalidIdentifier(_)));

        let err = service.insert("trucks", &fields(&[("plate", "x")])).await.unwrap_err();
        assert_eq!(err, RecordError::UnknownCollection("trucks".into()));

        let err = service
            .insert("cars", &fields(&[("plate", "x"), ("model", "y"), ("price", "1")]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RecordError::DisallowedField { collection: "cars".into(), field: "price".into() }
        );

        let err = service.insert("cars", &fields(&[("id", "5"), ("plate", "x")])).await.unwrap_err();
        assert!(matches!(err, RecordError::DisallowedField { .. }));

        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_store_unavailable_fails_insert() {
        let mut store = FakeStore::default();
        store.failing.insert("cars".into());
        let store = Arc::new(store);
        let service = InsertService::new(registry(), store.clone());

        let err = service
            .insert("cars", &fields(&[("plate", "x"), ("model", "y")]))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::StoreUnavailable { .. }));
        // not retried
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_persists_nothing() {
        let registry = registry();
        let store = Arc::new(memory_store(&registry).await);
        let service = InsertService::new(registry, store.clone());

        service.insert("cars", &fields(&[("plate", "1-1"), ("color", "red")])).await.unwrap_err();
        assert!(store.fetch_page("cars", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_or_missing_required_rejected_before_store() {
        let store = Arc::new(FakeStore::default());
        let service = InsertService::new(registry(), store.clone());

        let err = service
            .insert("cars", &fields(&[("plate", "12-3456"), ("model", "   ")]))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::ConstraintViolation { .. }), "{:?}", err);

        let err = service.insert("cars", &fields(&[("plate", "12-3456")])).await.unwrap_err();
        assert!(matches!(err, RecordError::ConstraintViolation { .. }), "{:?}", err);

        let err = service.insert("people_a", &fields(&[("name", ""), ("dial", "1")])).await.unwrap_err();
        assert!(matches!(err, RecordError::ConstraintViolation { .. }), "{:?}", err);

        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_inserted_record_is_searchable() {
        let registry = registry();
        let store = Arc::new(memory_store(&registry).await);
        let service = InsertService::new(registry.clone(), store.clone());
        service
            .insert("cars", &fields(&[("plate", "12-3456"), ("model", "Kia"), ("color", " ")]))
            .await
            .unwrap();

        let search = crate::search::SearchService::new(registry, store, None);
        let result = search
            .search("12-3456", crate::models::SearchCriteria::Plate, crate::search::SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(result.results.len(), 1);
        assert_eq!(search.browse("cars", 10, 0).await.unwrap().len(), 1);
    }
}
