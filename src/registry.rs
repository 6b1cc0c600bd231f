//! Schema registry - trusted mapping from collection name to kind and fields / 集合注册表
//!
//! Built once from configuration at startup and never mutated afterwards.
//! Every collection and field name is checked against the identifier pattern
//! here, so nothing caller-supplied reaches the store unless it names a
//! registered collection.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::config::CollectionConfig;
use crate::error::{RecordError, Result};
use crate::models::{CollectionKind, CollectionSummary, SearchCriteria};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{1,64}$").expect("identifier pattern compiles")
});

/// Store-assigned primary key column, never caller-writable / 主键列
pub const ID_FIELD: &str = "id";

/// JSON keys of the public record shapes; a declared field with one of these
/// names would be flattened next to them / 记录保留键
const RESERVED_FIELDS: &[&str] = &[
    "kind", "collection", "nationalId", "dateOfBirth",
    "ownerName", "ownerPhone", "imageUrl",
];

/// Check a collection or field name against the identifier pattern / 校验标识符
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

pub fn check_identifier(name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(RecordError::InvalidIdentifier(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub name: String,
    pub kind: CollectionKind,
    /// Declared fields in display order / 声明字段（显示顺序）
    pub fields: Vec<String>,
    pub unique: Vec<String>,
}

impl Collection {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.kind.required_fields().contains(&field)
    }

    /// Declared fields eligible for the given criteria, in candidate order / 可搜索字段
    pub fn search_fields(&self, criteria: SearchCriteria) -> Vec<String> {
        if criteria.kind() != self.kind {
            return Vec::new();
        }
        criteria
            .candidate_fields()
            .iter()
            .filter(|f| self.has_field(f))
            .map(|f| f.to_string())
            .collect()
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    fn from_config(cfg: &CollectionConfig) -> anyhow::Result<Self> {
        if !is_valid_identifier(&cfg.name) {
            anyhow::bail!("collection name {:?} is not a valid identifier", cfg.name);
        }
        let mut seen: Vec<&str> = Vec::with_capacity(cfg.fields.len());
        for field in &cfg.fields {
            if !is_valid_identifier(field) {
                anyhow::bail!("collection {}: field {:?} is not a valid identifier", cfg.name, field);
            }
            if field.eq_ignore_ascii_case(ID_FIELD) {
                anyhow::bail!("collection {}: `id` is store-assigned and cannot be declared", cfg.name);
            }
            if RESERVED_FIELDS.contains(&field.as_str()) {
                anyhow::bail!("collection {}: field name {} is reserved", cfg.name, field);
            }
            if seen.iter().any(|s| s.eq_ignore_ascii_case(field)) {
                anyhow::bail!("collection {}: field {} declared twice", cfg.name, field);
            }
            seen.push(field);
        }
        for required in cfg.kind.required_fields() {
            if !cfg.fields.iter().any(|f| f == required) {
                anyhow::bail!(
                    "collection {}: {} collections must declare field {}",
                    cfg.name, cfg.kind, required
                );
            }
        }
        for field in &cfg.unique {
            if !cfg.fields.contains(field) {
                anyhow::bail!("collection {}: unique field {} is not declared", cfg.name, field);
            }
        }
        Ok(Self {
            name: cfg.name.clone(),
            kind: cfg.kind,
            fields: cfg.fields.clone(),
            unique: cfg.unique.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    collections: Vec<Collection>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Build from configuration; fails on any invalid or duplicate definition / 从配置构建
    pub fn from_config(defs: &[CollectionConfig]) -> anyhow::Result<Self> {
        let mut registry = Self::default();
        for def in defs {
            let collection = Collection::from_config(def)?;
            // SQLite table names are case-insensitive
            let key = collection.name.to_ascii_lowercase();
            if registry.by_name.contains_key(&key) {
                anyhow::bail!("collection {} registered twice", collection.name);
            }
            registry.by_name.insert(key, registry.collections.len());
            registry.collections.push(collection);
        }
        tracing::debug!("Schema registry built with {} collections", registry.collections.len());
        Ok(registry)
    }

    pub fn list(&self) -> &[Collection] {
        &self.collections
    }

    pub fn summaries(&self) -> Vec<CollectionSummary> {
        self.collections.iter().map(Collection::summary).collect()
    }

    /// Collections of the given kind in registry order / 按类型解析集合
    pub fn resolve_collections(&self, kind: CollectionKind) -> Vec<&Collection> {
        self.collections.iter().filter(|c| c.kind == kind).collect()
    }

    /// Look up a caller-supplied collection name / 查找集合
    pub fn collection(&self, name: &str) -> Result<&Collection> {
        check_identifier(name)?;
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&idx| &self.collections[idx])
            .filter(|c| c.name == name)
            .ok_or_else(|| RecordError::UnknownCollection(name.to_string()))
    }

    /// Reject the first field not declared by the collection / 校验字段集合
    pub fn validate_field_set<'a, I>(&self, name: &str, fields: I) -> Result<&Collection>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let collection = self.collection(name)?;
        for field in fields {
            if !collection.has_field(field) {
                return Err(RecordError::DisallowedField {
                    collection: collection.name.clone(),
                    field: field.to_string(),
                });
            }
        }
        Ok(collection)
    }
}
