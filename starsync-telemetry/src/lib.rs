//! Telemetry setup shared by starsync binaries and tests.

pub mod tracing;
