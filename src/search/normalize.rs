//! Raw row -> public record shape / 行记录规范化
//!
//! A row missing `id` or one of its kind's required fields is dropped, never
//! surfaced half-built. Declared fields outside the fixed shape go to `extra`.

use std::collections::BTreeMap;

use crate::models::{CarRecord, CollectionKind, PersonRecord, RawRow, Record};
use crate::registry::{Collection, ID_FIELD};

const PERSON_FIELDS: &[&str] = &[
    "name", "dial", "dial2", "dial3", "dial4", "address",
    "national_id", "date_of_birth", "occupation", "notes",
];

const CAR_FIELDS: &[&str] = &[
    "plate", "model", "color", "year", "owner_name",
    "owner_phone", "image_url", "notes", "violations",
];

/// Why a row could not become a record / 缺失字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingField(pub &'static str);

/// A record shape produced from a collection of one kind / 某类型的记录
pub trait KindRecord: Sized + Into<Record> {
    const KIND: CollectionKind;

    fn from_row(collection: &Collection, row: &RawRow) -> Result<Self, MissingField>;
}

/// Non-blank value of a column / 取非空值
fn text(row: &RawRow, field: &str) -> Option<String> {
    row.get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(row: &RawRow, field: &'static str) -> Result<String, MissingField> {
    text(row, field).ok_or(MissingField(field))
}

fn row_id(row: &RawRow) -> Result<i64, MissingField> {
    row.get(ID_FIELD)
        .and_then(|v| v.trim().parse().ok())
        .ok_or(MissingField(ID_FIELD))
}

fn extra_fields(collection: &Collection, row: &RawRow, known: &[&str]) -> BTreeMap<String, String> {
    collection
        .fields
        .iter()
        .filter(|f| !known.contains(&f.as_str()))
        .filter_map(|f| text(row, f).map(|v| (f.clone(), v)))
        .collect()
}

impl KindRecord for PersonRecord {
    const KIND: CollectionKind = CollectionKind::Person;

    fn from_row(collection: &Collection, row: &RawRow) -> Result<Self, MissingField> {
        Ok(Self {
            id: row_id(row)?,
            name: required(row, "name")?,
            dial: required(row, "dial")?,
            dial2: text(row, "dial2"),
            dial3: text(row, "dial3"),
            dial4: text(row, "dial4"),
            address: text(row, "address"),
            national_id: text(row, "national_id"),
            date_of_birth: text(row, "date_of_birth"),
            occupation: text(row, "occupation"),
            notes: text(row, "notes"),
            collection: collection.name.clone(),
            extra: extra_fields(collection, row, PERSON_FIELDS),
        })
    }
}

impl KindRecord for CarRecord {
    const KIND: CollectionKind = CollectionKind::Vehicle;

    fn from_row(collection: &Collection, row: &RawRow) -> Result<Self, MissingField> {
        Ok(Self {
            id: row_id(row)?,
            plate: required(row, "plate")?,
            model: required(row, "model")?,
            color: text(row, "color"),
            year: text(row, "year"),
            owner_name: text(row, "owner_name"),
            owner_phone: text(row, "owner_phone"),
            image_url: text(row, "image_url"),
            notes: text(row, "notes"),
            violations: text(row, "violations"),
            collection: collection.name.clone(),
            extra: extra_fields(collection, row, CAR_FIELDS),
        })
    }
}

/// Normalize rows into `T`, dropping incomplete ones with a warning / 批量规范化
pub fn normalize_rows<T: KindRecord>(collection: &Collection, rows: Vec<RawRow>) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match T::from_row(collection, &row) {
            Ok(record) => out.push(record),
            Err(MissingField(field)) => {
                tracing::warn!(
                    "Dropping row from {} (id {:?}): missing required field {}",
                    collection.name, row.get(ID_FIELD), field
                );
            }
        }
    }
    out
}

/// Normalize rows into the record shape of the collection's kind / 按集合类型规范化
pub fn normalize_records(collection: &Collection, rows: Vec<RawRow>) -> Vec<Record> {
    match collection.kind {
        CollectionKind::Person => normalize_rows::<PersonRecord>(collection, rows)
            .into_iter()
            .map(Record::from)
            .collect(),
        CollectionKind::Vehicle => normalize_rows::<CarRecord>(collection, rows)
            .into_iter()
            .map(Record::from)
            .collect(),
    }
}
