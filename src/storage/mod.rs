//! Persistent Storage
//!
//! SQLite-backed storage with connection pooling, panic-safe transactions,
//! and version-tracked migrations.

pub mod database;

pub use database::{
    Database, PoolConfig, SharedDatabase, apply_entity_score, insert_generation_record,
    insert_insight, insert_message, record_usage,
};
