//! # Connector Layer
//!
//! Adapters on both sides of the application layer:
//! - Storage (DuckDB on disk, in-memory for tests and throwaway runs)
//! - The command-line API (container, router, controllers)

pub mod adapter;
pub mod api;

pub use adapter::*;
pub use api::*;
