mod acting_context;
mod car_inventory;
mod rental_lifecycle;
mod rental_queries;
mod reports;
mod transaction;
mod user_accounts;

pub use acting_context::*;
pub use car_inventory::*;
pub use rental_lifecycle::*;
pub use rental_queries::*;
pub use reports::*;
pub use user_accounts::*;
