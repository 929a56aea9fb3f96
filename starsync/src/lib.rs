//! Incremental CDC loading for a star-schema analytical warehouse.
//!
//! The engine keeps dimension and fact tables synchronized with their source
//! tables without re-scanning unchanged data: per-table watermarks bound the
//! change selection, changed rows are merged with upsert semantics and
//! last-writer-wins conflict resolution, and tables are processed in
//! dependency order so facts never land before the dimensions they reference.
//!
//! The [`coordinator::LoadCoordinator`] drives a cycle over pluggable
//! [`source::base::ChangeSource`], [`sink::base::WarehouseSink`], and
//! [`store::base::WatermarkStore`] implementations and reports every outcome
//! through a structured [`state::cycle::CycleResult`].

pub mod concurrency;
pub mod coordinator;
pub mod error;
mod macros;
pub mod merge;
pub mod ordering;
pub mod plan;
pub mod sink;
pub mod source;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
