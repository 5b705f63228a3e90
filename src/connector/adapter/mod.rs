mod duckdb_rental_store;
mod in_memory_rental_store;

pub use duckdb_rental_store::*;
pub use in_memory_rental_store::*;
