//! # Domain Layer
//!
//! Entity model, lifecycle rules and the error taxonomy.
//! This layer is independent of storage and presentation.

mod error;
pub mod models;

pub use error::*;
pub use models::*;
