//! Configuration types and loading for the starsync warehouse loader.
//!
//! The crate is split between [`shared`], which holds the serde-deserializable
//! configuration structures consumed by the core engine, and [`load`], which
//! implements hierarchical loading from configuration files and environment
//! variable overrides.

pub mod environment;
pub mod load;
pub mod shared;
