//! Search module - record search over registered collections / 搜索模块
//!
//! Architecture principles / 架构原则：
//! - Registry decides which collections and fields a criteria touches
//! - Store executes one bound-parameter scan per collection
//! - Service owns ordering, progress, degradation and normalization
//! - Call direction: API → Service → Registry/Store (unidirectional) / 调用方向

pub mod normalize;
pub mod service;

pub use normalize::{normalize_records, KindRecord, MissingField};
pub use service::{SearchOptions, SearchProgress, SearchService};
