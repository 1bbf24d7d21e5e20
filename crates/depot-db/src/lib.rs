//! Depot metadata index
//!
//! Persistent record of every uploaded object and its download statistics,
//! backed by SQLite through `sqlx`.

pub mod db;

pub use db::{connect_pool, MetadataIndex, RecordKey, MIGRATOR};
