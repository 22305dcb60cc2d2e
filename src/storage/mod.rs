//! Time-series log store: rotating segment files under one data directory.

pub mod segment;
mod store;

pub use store::{DEFAULT_MAX_SEGMENT_BYTES, DEFAULT_RECENT_LIMIT, LogStore, StoreConfig};
