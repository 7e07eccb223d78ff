//! Detection record storage for the Vigil pipeline.
//!
//! - [`RecordStore`]: persistent media descriptors and detection records,
//!   with an in-memory and a Redis engine
//! - [`ResultIndexer`]: idempotent, atomic commit of a succeeded job's records
//! - [`QueryEngine`]: criteria queries that return access handles

pub mod error;
pub mod indexer;
pub mod memory;
pub mod metrics;
pub mod query;
pub mod redis_store;
pub mod store;

pub use error::{IndexWriteError, QueryError, RecordError, RecordResult};
pub use indexer::{IndexerConfig, ResultIndexer};
pub use memory::InMemoryRecordStore;
pub use query::{QueryConfig, QueryEngine};
pub use redis_store::RedisRecordStore;
pub use store::{BatchOutcome, RecordStore, RecordStoreConfig, RecordStoreKind};
