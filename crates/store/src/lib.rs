//! Buffered keyed data and the keyed data store: the append-only row
//! buffer, its in-place remap/sort, the k-way merge that folds unmerged
//! buffers together, and the store that wraps them
//! with flush/merge/take-data policies.

#![warn(missing_docs)]

pub mod keyed_store;
pub mod kway_merge;
pub mod slab;

pub use keyed_store::{KeyedDataStore, UNMERGED_FLUSH_THRESHOLD_BYTES};
pub use kway_merge::merge_sorted;
pub use slab::{BufferedKeyedData, SealedBuffer};
