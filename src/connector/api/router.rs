use anyhow::Result;

use crate::cli::{AdminCommands, Commands};
use crate::domain::DomainError;

use super::container::Container;
use super::controller::{AccountController, AdminController, CarController, RentalController};

pub struct Router<'a> {
    account_controller: AccountController<'a>,
    car_controller: CarController<'a>,
    rental_controller: RentalController<'a>,
    admin_controller: AdminController<'a>,
}

impl<'a> Router<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self {
            account_controller: AccountController::new(container),
            car_controller: CarController::new(container),
            rental_controller: RentalController::new(container),
            admin_controller: AdminController::new(container),
        }
    }

    /// Dispatches one command. `acting_user` is the id given with `--as`.
    pub async fn route(&self, command: Commands, acting_user: Option<i64>) -> Result<String> {
        match command {
            Commands::Seed => self.account_controller.seed().await,
            Commands::Register {
                username,
                email,
                password,
                full_name,
                phone,
                address,
            } => {
                self.account_controller
                    .register(username, email, password, full_name, phone, address)
                    .await
            }
            Commands::Login { username, password } => {
                self.account_controller.login(username, password).await
            }
            Commands::Passwd { current, new } => {
                let actor = self.account_controller.actor(acting_user).await?;
                self.account_controller.change_password(&actor, current, new).await
            }
            Commands::Cars { all, search, format } => {
                self.car_controller.list(all, search, format).await
            }
            Commands::Car { id, format } => self.car_controller.show(id, format).await,
            Commands::Rent {
                car_id,
                from,
                to,
                notes,
                format,
            } => {
                let actor = self.account_controller.actor(acting_user).await?;
                self.rental_controller
                    .rent(&actor, car_id, from, to, notes, format)
                    .await
            }
            Commands::Return { rental_id, notes } => {
                let actor = self.account_controller.actor(acting_user).await?;
                self.rental_controller.return_car(&actor, rental_id, notes).await
            }
            Commands::Cancel { rental_id, notes } => {
                let actor = self.account_controller.actor(acting_user).await?;
                self.rental_controller.cancel(&actor, rental_id, notes).await
            }
            Commands::Rentals {
                user,
                status,
                format,
            } => {
                let actor = self.account_controller.actor(acting_user).await?;
                self.rental_controller.list(&actor, user, status, format).await
            }
            Commands::Rental { id, format } => {
                let actor = self.account_controller.actor(acting_user).await?;
                self.rental_controller.details(&actor, id, format).await
            }
            Commands::History { rental_id, format } => {
                let actor = self.account_controller.actor(acting_user).await?;
                self.rental_controller.history(&actor, rental_id, format).await
            }
            Commands::Admin(admin) => {
                let actor = self.account_controller.actor(acting_user).await?;
                match admin {
                    AdminCommands::AddCar { plate, details } => {
                        self.admin_controller.add_car(&actor, plate, details).await
                    }
                    AdminCommands::EditCar { id, details } => {
                        self.admin_controller.edit_car(&actor, id, details).await
                    }
                    AdminCommands::DeactivateCar { id } => {
                        self.admin_controller.deactivate_car(&actor, id).await
                    }
                    AdminCommands::DeactivateUser { id } => {
                        self.admin_controller.deactivate_user(&actor, id).await
                    }
                    AdminCommands::SetStatus {
                        rental_id,
                        status,
                        notes,
                    } => {
                        self.admin_controller
                            .set_status(&actor, rental_id, status, notes)
                            .await
                    }
                    AdminCommands::Stats => self.admin_controller.stats(&actor).await,
                    AdminCommands::Report {
                        from,
                        to,
                        status,
                        format,
                    } => {
                        self.admin_controller
                            .report(&actor, from, to, status, format)
                            .await
                    }
                }
            }
        }
    }
}

/// What the end user sees for a failed command. Storage failures are not
/// described beyond "operation failed"; their root cause goes to the log.
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<DomainError>() {
        Some(DomainError::Persistence { .. }) | Some(DomainError::Internal(_)) => {
            "Operation failed. Please try again later.".to_string()
        }
        Some(DomainError::Concurrency(_)) => {
            "The car is no longer available or was changed by someone else. Please retry.".to_string()
        }
        Some(domain) => domain.to_string(),
        None => err.to_string(),
    }
}
