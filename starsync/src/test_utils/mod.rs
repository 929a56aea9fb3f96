//! Test fixtures and helpers shared by unit and integration tests.

pub mod schema;
pub mod sinks;
