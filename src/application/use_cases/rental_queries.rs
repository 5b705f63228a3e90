use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::transaction;
use crate::application::{ActingContext, RentalStore, UnitOfWork};
use crate::domain::{Car, DomainError, Rental, RentalHistory, RentalStatus, User};

/// A history entry with the acting user's name resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub entry: RentalHistory,
    pub actor_username: Option<String>,
}

/// A rental with its car, customer and audit trail loaded explicitly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalDetails {
    pub rental: Rental,
    pub car: Car,
    pub user: User,
    /// Newest first.
    pub history: Vec<HistoryEntry>,
}

/// Read side of the rental lifecycle. Every call uses a read-only unit of work.
pub struct RentalQueriesUseCase {
    store: Arc<dyn RentalStore>,
}

impl RentalQueriesUseCase {
    pub fn new(store: Arc<dyn RentalStore>) -> Self {
        Self { store }
    }

    pub async fn get_rental_by_id(&self, rental_id: i64) -> Result<Option<Rental>, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = uow.rentals().get_by_id(rental_id).await;
        transaction::read(uow, result).await
    }

    /// The owner or an administrator may see a rental's details.
    pub async fn get_rental_details(
        &self,
        actor: &ActingContext,
        rental_id: i64,
    ) -> Result<RentalDetails, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = Self::load_details(&mut uow, actor, rental_id).await;
        transaction::read(uow, result).await
    }

    /// The user's rentals, most recently booked first.
    pub async fn list_rentals_for_user(&self, user_id: i64) -> Result<Vec<Rental>, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = match uow.rentals().query().await {
            Ok(query) => Ok(query
                .filter(|r| r.is_owned_by(user_id))
                .order_by_desc(|r| (r.created_at(), r.id()))
                .to_vec()),
            Err(e) => Err(e),
        };
        transaction::read(uow, result).await
    }

    /// All rentals, optionally of one status, latest rental date first.
    pub async fn list_all_rentals(
        &self,
        status: Option<RentalStatus>,
    ) -> Result<Vec<Rental>, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = match uow.rentals().query().await {
            Ok(query) => Ok(query
                .filter(|r| status.map_or(true, |s| r.status() == s))
                .order_by_desc(|r| (r.rental_date(), r.id()))
                .to_vec()),
            Err(e) => Err(e),
        };
        transaction::read(uow, result).await
    }

    /// Active, unoccupied cars ordered by brand then model.
    pub async fn get_available_cars(&self) -> Result<Vec<Car>, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = match uow.cars().query().await {
            Ok(query) => Ok(query
                .filter(Car::is_available)
                .order_by(|c| (c.brand().to_string(), c.model().to_string()))
                .to_vec()),
            Err(e) => Err(e),
        };
        transaction::read(uow, result).await
    }

    /// Any car, including deactivated ones, so historical rentals stay readable.
    pub async fn get_car_by_id(&self, car_id: i64) -> Result<Option<Car>, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = uow.cars().get_by_id(car_id).await;
        transaction::read(uow, result).await
    }

    async fn load_details(
        uow: &mut UnitOfWork,
        actor: &ActingContext,
        rental_id: i64,
    ) -> Result<RentalDetails, DomainError> {
        let rental = uow
            .rentals()
            .get_by_id(rental_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("rental {}", rental_id)))?;

        if !actor.is_admin() && !rental.is_owned_by(actor.user_id) {
            return Err(DomainError::unauthorized(format!(
                "rental {} does not belong to user {}",
                rental_id, actor.user_id
            )));
        }

        let car = uow
            .cars()
            .get_by_id(rental.car_id())
            .await?
            .ok_or_else(|| DomainError::not_found(format!("car {}", rental.car_id())))?;
        let user = uow
            .users()
            .get_by_id(rental.user_id())
            .await?
            .ok_or_else(|| DomainError::not_found(format!("user {}", rental.user_id())))?;

        let history = history_newest_first(uow, rental_id).await?;

        Ok(RentalDetails {
            rental,
            car,
            user,
            history,
        })
    }
}

/// History of one rental with actor names, newest first.
pub(crate) async fn history_newest_first(
    uow: &mut UnitOfWork,
    rental_id: i64,
) -> Result<Vec<HistoryEntry>, DomainError> {
    let entries = uow
        .rental_histories()
        .query()
        .await?
        .filter(|h| h.rental_id() == rental_id)
        .order_by_desc(|h| (h.action_date(), h.id()))
        .to_vec();

    let usernames: HashMap<i64, String> = uow
        .users()
        .all()
        .await?
        .into_iter()
        .map(|u| (u.id(), u.username().to_string()))
        .collect();

    Ok(entries
        .into_iter()
        .map(|entry| HistoryEntry {
            actor_username: entry.action_by().and_then(|id| usernames.get(&id).cloned()),
            entry,
        })
        .collect())
}
