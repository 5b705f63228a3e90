mod clock;
mod rental_store;

pub use clock::*;
pub use rental_store::*;
