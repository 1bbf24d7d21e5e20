//! Database access for the metadata index
//
// Record and statistics operations
pub mod index;
//
// Id normalization for index operations
pub mod key;
//
// Pool construction and embedded migrations
pub mod pool;

pub use index::MetadataIndex;
pub use key::RecordKey;
pub use pool::{connect_pool, MIGRATOR};
