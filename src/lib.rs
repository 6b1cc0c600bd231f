pub mod client;
pub mod config;
pub mod error;
pub mod insert;
pub mod models;
pub mod registry;
pub mod search;
pub mod store;

pub use error::{ErrorCategory, RecordError};
pub use insert::InsertService;
pub use registry::SchemaRegistry;
pub use search::SearchService;
pub use store::{RecordStore, SqliteRecordStore};
