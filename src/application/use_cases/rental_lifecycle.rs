use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::transaction;
use crate::application::{ActingContext, Clock, RentalStore, TransactionOptions, UnitOfWork};
use crate::domain::{
    Car, CarStatus, DomainError, HistoryAction, Rental, RentalHistory, RentalPeriod, RentalStatus,
};

/// Input for booking a car.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRental {
    pub car_id: i64,
    pub rental_date: NaiveDate,
    pub return_date: NaiveDate,
    pub notes: Option<String>,
}

/// Create, return, cancel and administrative close of rentals.
///
/// Every operation runs in its own transaction: the rental, the car status and
/// the history entry are committed together or not at all. Conflicting car
/// updates surface as [`DomainError::Concurrency`]; nothing is retried here.
pub struct RentalLifecycleUseCase {
    store: Arc<dyn RentalStore>,
    clock: Arc<dyn Clock>,
    options: TransactionOptions,
}

impl RentalLifecycleUseCase {
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

    pub async fn create_rental(
        &self,
        actor: &ActingContext,
        request: NewRental,
    ) -> Result<Rental, DomainError> {
        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = self.open_rental(&mut uow, actor, &request).await;
        let rental = transaction::finish(uow, result, "create_rental").await?;

        info!(
            "Rental {} created: car {} for user {}, {} days, total {}",
            rental.id(),
            rental.car_id(),
            rental.user_id(),
            rental.total_days(),
            rental.total_price()
        );
        Ok(rental)
    }

    pub async fn return_rental(
        &self,
        actor: &ActingContext,
        rental_id: i64,
        notes: Option<&str>,
    ) -> Result<Rental, DomainError> {
        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = self
            .close_rental(&mut uow, actor, rental_id, Closing::Return, notes)
            .await;
        let rental = transaction::finish(uow, result, "return_rental").await?;

        info!("Rental {} returned; car {} available", rental.id(), rental.car_id());
        Ok(rental)
    }

    pub async fn cancel_rental(
        &self,
        actor: &ActingContext,
        rental_id: i64,
        notes: Option<&str>,
    ) -> Result<Rental, DomainError> {
        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = self
            .close_rental(&mut uow, actor, rental_id, Closing::Cancel, notes)
            .await;
        let rental = transaction::finish(uow, result, "cancel_rental").await?;

        info!("Rental {} cancelled; car {} available", rental.id(), rental.car_id());
        Ok(rental)
    }

    /// Administrative close of an active rental into a terminal status.
    pub async fn admin_update_status(
        &self,
        actor: &ActingContext,
        rental_id: i64,
        status: RentalStatus,
        notes: Option<&str>,
    ) -> Result<Rental, DomainError> {
        actor.require_admin()?;
        let closing = match status {
            RentalStatus::Completed => Closing::AdminComplete,
            RentalStatus::Cancelled => Closing::AdminCancel,
            RentalStatus::Active => {
                return Err(DomainError::validation(
                    "status",
                    "an active rental can only be set to completed or cancelled",
                ))
            }
        };

        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = self
            .close_rental(&mut uow, actor, rental_id, closing, notes)
            .await;
        let rental = transaction::finish(uow, result, "admin_update_status").await?;

        info!(
            "Rental {} set to {} by admin {}",
            rental.id(),
            rental.status().as_str(),
            actor.user_id
        );
        Ok(rental)
    }

    async fn open_rental(
        &self,
        uow: &mut UnitOfWork,
        actor: &ActingContext,
        request: &NewRental,
    ) -> Result<Rental, DomainError> {
        let now = self.clock.now();

        let user = uow
            .users()
            .get_by_id(actor.user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("user {}", actor.user_id)))?;
        if !user.is_active() {
            return Err(DomainError::validation("user_id", "account is inactive"));
        }

        let mut car = uow
            .cars()
            .get_by_id(request.car_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("car {}", request.car_id)))?;
        ensure_bookable(&car)?;

        let period = RentalPeriod::new(request.rental_date, request.return_date, self.clock.today())?;
        let rental = Rental::open(user.id(), &car, period, request.notes.as_deref(), now)?;

        // The version-checked car update goes first so a competing booking fails on it.
        car.mark_rented(now);
        uow.cars().update(car)?;
        let rental = uow.rentals().add(rental).await?;
        uow.persist().await?;

        let entry = RentalHistory::record(
            rental.id(),
            HistoryAction::RentalCreated,
            Some(user.id()),
            format!("Rental created for {} days", rental.total_days()),
            now,
        );
        uow.rental_histories().add(entry).await?;

        Ok(rental)
    }

    async fn close_rental(
        &self,
        uow: &mut UnitOfWork,
        actor: &ActingContext,
        rental_id: i64,
        closing: Closing,
        notes: Option<&str>,
    ) -> Result<Rental, DomainError> {
        let now = self.clock.now();

        let mut rental = uow
            .rentals()
            .get_by_id(rental_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("rental {}", rental_id)))?;

        if !closing.is_admin() && !rental.is_owned_by(actor.user_id) {
            return Err(DomainError::unauthorized(format!(
                "rental {} does not belong to user {}",
                rental_id, actor.user_id
            )));
        }

        match closing {
            Closing::Return | Closing::AdminComplete => rental.complete(now, notes)?,
            Closing::Cancel | Closing::AdminCancel => rental.cancel(now, notes)?,
        }

        let mut car = uow
            .cars()
            .get_by_id(rental.car_id())
            .await?
            .ok_or_else(|| DomainError::not_found(format!("car {}", rental.car_id())))?;
        car.mark_available(now);

        uow.rentals().update(rental.clone())?;
        uow.cars().update(car)?;
        uow.persist().await?;

        let entry = RentalHistory::record(
            rental.id(),
            closing.action(),
            Some(actor.user_id),
            closing.history_note(rental.status()),
            now,
        );
        uow.rental_histories().add(entry).await?;

        Ok(rental)
    }
}

fn ensure_bookable(car: &Car) -> Result<(), DomainError> {
    if !car.is_active() {
        return Err(DomainError::validation(
            "car_id",
            format!("car {} is no longer offered", car.id()),
        ));
    }
    if car.status() != CarStatus::Available {
        return Err(DomainError::validation(
            "car_id",
            format!("car {} is not available", car.id()),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closing {
    Return,
    Cancel,
    AdminComplete,
    AdminCancel,
}

impl Closing {
    fn is_admin(&self) -> bool {
        matches!(self, Closing::AdminComplete | Closing::AdminCancel)
    }

    fn action(&self) -> HistoryAction {
        match self {
            Closing::Return => HistoryAction::CarReturned,
            Closing::Cancel => HistoryAction::RentalCancelled,
            Closing::AdminComplete | Closing::AdminCancel => HistoryAction::StatusUpdated,
        }
    }

    fn history_note(&self, status: RentalStatus) -> String {
        match self {
            Closing::Return => "Car returned by customer".to_string(),
            Closing::Cancel => "Rental cancelled by customer".to_string(),
            Closing::AdminComplete | Closing::AdminCancel => {
                format!("Status set to {} by admin", status.as_str())
            }
        }
    }
}
