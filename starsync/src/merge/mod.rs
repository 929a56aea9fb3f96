//! Upsert merging with conflict resolution.

mod merger;

pub use merger::{MergeOutcome, Merger, RejectReason, RowRejection};
