//! # Application Layer
//!
//! Storage and clock ports, the unit of work, and the use cases that drive the
//! rental lifecycle through them.

pub mod interfaces;
mod unit_of_work;
pub mod use_cases;

pub use interfaces::*;
pub use unit_of_work::*;
pub use use_cases::*;
