use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Raw row as returned by the store: column -> value, NULL columns omitted / 原始行
pub type RawRow = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Person,
    Vehicle,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Vehicle => "vehicle",
        }
    }

    /// Fields every collection of this kind must declare / 必填字段
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Person => &["name", "dial"],
            Self::Vehicle => &["plate", "model"],
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchCriteria {
    Name,
    Phone,
    Plate,
    Model,
}

impl SearchCriteria {
    pub fn kind(&self) -> CollectionKind {
        match self {
            Self::Name | Self::Phone => CollectionKind::Person,
            Self::Plate | Self::Model => CollectionKind::Vehicle,
        }
    }

    /// Candidate columns for this criteria, before intersecting with a collection's fields
    pub fn candidate_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Name => &["name"],
            Self::Phone => &["dial", "dial2", "dial3", "dial4"],
            Self::Plate => &["plate"],
            Self::Model => &["model"],
        }
    }

    pub fn match_mode(&self) -> MatchMode {
        match self {
            Self::Plate => MatchMode::Equals,
            Self::Name | Self::Phone | Self::Model => MatchMode::ContainsCaseInsensitive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Phone => "phone",
            Self::Plate => "plate",
            Self::Model => "model",
        }
    }
}

impl FromStr for SearchCriteria {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "phone" => Ok(Self::Phone),
            "plate" => Ok(Self::Plate),
            "model" => Ok(Self::Model),
            other => Err(format!("unknown search type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Equals,
    ContainsCaseInsensitive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub kind: CollectionKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonRecord {
    pub id: i64,
    pub name: String,
    pub dial: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub collection: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl PersonRecord {
    pub fn phones(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.dial.as_str())
            .chain(self.dial2.as_deref())
            .chain(self.dial3.as_deref())
            .chain(self.dial4.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CarRecord {
    pub id: i64,
    pub plate: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<String>,
    pub collection: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Person(PersonRecord),
    Vehicle(CarRecord),
}

impl Record {
    pub fn id(&self) -> i64 {
        match self {
            Self::Person(p) => p.id,
            Self::Vehicle(c) => c.id,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            Self::Person(p) => &p.collection,
            Self::Vehicle(c) => &c.collection,
        }
    }
}

impl From<PersonRecord> for Record {
    fn from(p: PersonRecord) -> Self {
        Self::Person(p)
    }
}

impl From<CarRecord> for Record {
    fn from(c: CarRecord) -> Self {
        Self::Vehicle(c)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult<T> {
    pub results: Vec<T>,
    /// Wall-clock milliseconds for the whole multi-collection operation
    pub search_time: u64,
    /// Rows examined across successfully scanned collections, matched or not
    pub total_scanned: u64,
    #[serde(default)]
    pub skipped_collections: Vec<String>,
    /// Collections that matched more rows than the per-collection cap returned
    #[serde(default)]
    pub truncated_collections: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl<T> SearchResult<T> {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            search_time: 0,
            total_scanned: 0,
            skipped_collections: Vec::new(),
            truncated_collections: Vec::new(),
            cancelled: false,
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.skipped_collections.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> SearchResult<U> {
        SearchResult {
            results: self.results.into_iter().map(f).collect(),
            search_time: self.search_time,
            total_scanned: self.total_scanned,
            skipped_collections: self.skipped_collections,
            truncated_collections: self.truncated_collections,
            cancelled: self.cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub username: String,
    pub full_name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Operator {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub enabled: bool,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl From<&Operator> for AuthUser {
    fn from(op: &Operator) -> Self {
        Self {
            username: op.username.clone(),
            full_name: op.full_name.clone(),
            role: op.role.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_kind_and_mode() {
        assert_eq!(SearchCriteria::Phone.kind(), CollectionKind::Person);
        assert_eq!(SearchCriteria::Model.kind(), CollectionKind::Vehicle);
        assert_eq!(SearchCriteria::Plate.match_mode(), MatchMode::Equals);
        assert_eq!(SearchCriteria::Phone.match_mode(), MatchMode::ContainsCaseInsensitive);
        assert_eq!("plate".parse::<SearchCriteria>(), Ok(SearchCriteria::Plate));
        assert!("email".parse::<SearchCriteria>().is_err());
    }

    #[test]
    fn test_person_record_json_omits_missing_phones() {
        let person = PersonRecord {
            id: 7,
            name: "Ahmed".into(),
            dial: "0791234567".into(),
            collection: "people_a".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(Record::from(person)).unwrap();
        assert_eq!(json["kind"], "person");
        assert_eq!(json["dial"], "0791234567");
        assert!(json.get("dial2").is_none());
        assert!(json.get("nationalId").is_none());
    }

    #[test]
    fn test_extra_fields_flatten() {
        let mut car = CarRecord {
            id: 1,
            plate: "12-3456".into(),
            model: "Toyota".into(),
            owner_name: Some("Sara".into()),
            collection: "cars".into(),
            ..Default::default()
        };
        car.extra.insert("vin".into(), "JT123".into());
        let json = serde_json::to_value(Record::from(car.clone())).unwrap();
        assert_eq!(json["ownerName"], "Sara");
        assert_eq!(json["vin"], "JT123");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, Record::Vehicle(car));
    }

    #[test]
    fn test_phones_iterates_present_numbers() {
        let person = PersonRecord {
            dial: "1".into(),
            dial3: Some("3".into()),
            ..Default::default()
        };
        assert_eq!(person.phones().collect::<Vec<_>>(), vec!["1", "3"]);
    }
}
