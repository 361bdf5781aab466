//! Storage layer: in-memory vector index over law units with on-disk snapshots.

mod error;
pub use error::StoreError;

mod index;
pub use index::{IndexOptions, IndexStats, VectorIndex};

mod persist;
pub use persist::index_exists;
