pub mod account_controller;
pub mod admin_controller;
pub mod car_controller;
pub mod rental_controller;

pub use account_controller::AccountController;
pub use admin_controller::AdminController;
pub use car_controller::CarController;
pub use rental_controller::RentalController;
