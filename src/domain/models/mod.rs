mod car;
mod record;
mod rental;
mod rental_history;
mod user;

pub use car::*;
pub use record::*;
pub use rental::*;
pub use rental_history::*;
pub use user::*;
