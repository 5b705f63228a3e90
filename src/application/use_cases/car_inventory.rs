use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::transaction;
use crate::application::{ActingContext, Clock, RentalStore, TransactionOptions, UnitOfWork};
use crate::domain::{Car, CarDetails, CarStatus, DomainError};

/// Input for registering a car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCar {
    pub license_plate: String,
    pub details: CarDetails,
}

/// Administrative inventory management and catalogue search.
pub struct CarInventoryUseCase {
    store: Arc<dyn RentalStore>,
    clock: Arc<dyn Clock>,
    options: TransactionOptions,
}

impl CarInventoryUseCase {
    pub fn new(store: Arc<dyn RentalStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            options: TransactionOptions::default(),
        }
    }

    pub fn with_transaction_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn add_car(&self, actor: &ActingContext, new_car: NewCar) -> Result<Car, DomainError> {
        actor.require_admin()?;
        let plate = new_car.license_plate.trim().to_string();
        if plate.is_empty() {
            return Err(DomainError::validation("license_plate", "is required"));
        }
        if plate.chars().count() > 20 {
            return Err(DomainError::validation("license_plate", "exceeds 20 characters"));
        }
        validate_details(&new_car.details)?;

        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = async {
            let taken = uow
                .cars()
                .any(|c| c.license_plate().eq_ignore_ascii_case(&plate))
                .await?;
            if taken {
                return Err(DomainError::validation(
                    "license_plate",
                    format!("{} is already registered", plate),
                ));
            }
            uow.cars()
                .add(Car::register(plate.clone(), new_car.details, self.clock.now()))
                .await
        }
        .await;
        let car = transaction::finish(uow, result, "add_car").await?;

        info!("Car {} registered: {} [{}]", car.id(), car.display_name(), car.license_plate());
        Ok(car)
    }

    /// Replaces a car's editable attributes. Existing rentals keep their price.
    pub async fn edit_car(
        &self,
        actor: &ActingContext,
        car_id: i64,
        details: CarDetails,
    ) -> Result<Car, DomainError> {
        actor.require_admin()?;
        validate_details(&details)?;

        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = async {
            let mut car = uow
                .cars()
                .get_by_id(car_id)
                .await?
                .ok_or_else(|| DomainError::not_found(format!("car {}", car_id)))?;
            car.revise(details, self.clock.now());
            uow.cars().update(car.clone())?;
            Ok::<_, DomainError>(car)
        }
        .await;
        let car = transaction::finish(uow, result, "edit_car").await?;

        info!("Car {} updated", car.id());
        Ok(car)
    }

    /// Soft delete. A car on an active rental cannot be withdrawn.
    pub async fn deactivate_car(&self, actor: &ActingContext, car_id: i64) -> Result<Car, DomainError> {
        actor.require_admin()?;

        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = async {
            let mut car = uow
                .cars()
                .get_by_id(car_id)
                .await?
                .ok_or_else(|| DomainError::not_found(format!("car {}", car_id)))?;
            if car.status() == CarStatus::Rented {
                return Err(DomainError::validation(
                    "car_id",
                    format!("car {} is currently rented", car_id),
                ));
            }
            car.deactivate(self.clock.now());
            uow.cars().update(car.clone())?;
            Ok::<_, DomainError>(car)
        }
        .await;
        let car = transaction::finish(uow, result, "deactivate_car").await?;

        info!("Car {} deactivated", car.id());
        Ok(car)
    }

    /// Active cars whose brand, model or plate contains `term`, ordered by brand then model.
    pub async fn search_cars(&self, term: &str) -> Result<Vec<Car>, DomainError> {
        let term = term.trim().to_string();
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = match uow.cars().query().await {
            Ok(query) => Ok(query
                .filter(|c| c.is_active() && (term.is_empty() || c.matches_term(&term)))
                .order_by(|c| (c.brand().to_string(), c.model().to_string()))
                .to_vec()),
            Err(e) => Err(e),
        };
        transaction::read(uow, result).await
    }

    /// Whole inventory by id, optionally including deactivated cars.
    pub async fn list_cars(&self, include_inactive: bool) -> Result<Vec<Car>, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = match uow.cars().query().await {
            Ok(query) => Ok(query
                .filter(|c| include_inactive || c.is_active())
                .order_by(|c| c.id())
                .to_vec()),
            Err(e) => Err(e),
        };
        transaction::read(uow, result).await
    }
}

fn validate_details(details: &CarDetails) -> Result<(), DomainError> {
    let brand = details.brand.trim();
    if brand.is_empty() || brand.chars().count() > 50 {
        return Err(DomainError::validation("brand", "must be 1 to 50 characters"));
    }
    let model = details.model.trim();
    if model.is_empty() || model.chars().count() > 50 {
        return Err(DomainError::validation("model", "must be 1 to 50 characters"));
    }
    if !(1900..=2100).contains(&details.year) {
        return Err(DomainError::validation("year", "must be between 1900 and 2100"));
    }
    if details.daily_rate <= Decimal::ZERO {
        return Err(DomainError::validation("daily_rate", "must be positive"));
    }
    if details.daily_rate.normalize().scale() > 2 {
        return Err(DomainError::validation(
            "daily_rate",
            "must have at most two decimal places",
        ));
    }
    if let Some(capacity) = details.capacity {
        if !(1..=50).contains(&capacity) {
            return Err(DomainError::validation("capacity", "must be between 1 and 50"));
        }
    }
    Ok(())
}
