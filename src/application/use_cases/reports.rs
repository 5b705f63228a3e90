use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::rental_queries::{history_newest_first, HistoryEntry};
use super::transaction;
use crate::application::{ActingContext, RentalStore, UnitOfWork};
use crate::domain::{CarStatus, DomainError, RentalStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_cars: usize,
    pub available_cars: usize,
    pub rented_cars: usize,
    pub active_rentals: usize,
}

/// Rental-date range (inclusive) and status restriction for [`ReportsUseCase::rental_report`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<RentalStatus>,
}

/// One rental joined with its customer and car.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalReportRow {
    pub rental_id: i64,
    pub username: String,
    pub full_name: String,
    pub car: String,
    pub license_plate: String,
    pub rental_date: NaiveDate,
    pub return_date: NaiveDate,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub total_days: i32,
    pub total_price: Decimal,
    pub status: RentalStatus,
}

/// Audit and reporting reads. Never writes.
pub struct ReportsUseCase {
    store: Arc<dyn RentalStore>,
}

impl ReportsUseCase {
    pub fn new(store: Arc<dyn RentalStore>) -> Self {
        Self { store }
    }

    pub async fn dashboard(&self, actor: &ActingContext) -> Result<DashboardStats, DomainError> {
        actor.require_admin()?;
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = async {
            let cars = uow.cars().find(|c| c.is_active()).await?;
            let active_rentals = uow.rentals().count(|r| r.is_active()).await?;
            Ok::<_, DomainError>(DashboardStats {
                total_cars: cars.len(),
                available_cars: cars.iter().filter(|c| c.status() == CarStatus::Available).count(),
                rented_cars: cars.iter().filter(|c| c.status() == CarStatus::Rented).count(),
                active_rentals,
            })
        }
        .await;
        transaction::read(uow, result).await
    }

    /// Rentals matching `filter`, latest rental date first.
    pub async fn rental_report(
        &self,
        actor: &ActingContext,
        filter: ReportFilter,
    ) -> Result<Vec<RentalReportRow>, DomainError> {
        actor.require_admin()?;
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(DomainError::validation("from", "must not be after the end date"));
            }
        }

        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = async {
            let rentals = uow
                .rentals()
                .query()
                .await?
                .filter(|r| filter.from.map_or(true, |from| r.rental_date() >= from))
                .filter(|r| filter.to.map_or(true, |to| r.rental_date() <= to))
                .filter(|r| filter.status.map_or(true, |s| r.status() == s))
                .order_by_desc(|r| (r.rental_date(), r.id()))
                .to_vec();

            let users: HashMap<_, _> = uow.users().all().await?.into_iter().map(|u| (u.id(), u)).collect();
            let cars: HashMap<_, _> = uow.cars().all().await?.into_iter().map(|c| (c.id(), c)).collect();

            let mut rows = Vec::with_capacity(rentals.len());
            for rental in rentals {
                let user = users
                    .get(&rental.user_id())
                    .ok_or_else(|| DomainError::not_found(format!("user {}", rental.user_id())))?;
                let car = cars
                    .get(&rental.car_id())
                    .ok_or_else(|| DomainError::not_found(format!("car {}", rental.car_id())))?;

                rows.push(RentalReportRow {
                    rental_id: rental.id(),
                    username: user.username().to_string(),
                    full_name: user.full_name().to_string(),
                    car: car.display_name(),
                    license_plate: car.license_plate().to_string(),
                    rental_date: rental.rental_date(),
                    return_date: rental.return_date(),
                    actual_return_date: rental.actual_return_date(),
                    total_days: rental.total_days(),
                    total_price: rental.total_price(),
                    status: rental.status(),
                });
            }
            Ok::<_, DomainError>(rows)
        }
        .await;
        transaction::read(uow, result).await
    }

    /// Audit trail of one rental, newest first. Owner or administrator only.
    pub async fn rental_history(
        &self,
        actor: &ActingContext,
        rental_id: i64,
    ) -> Result<Vec<HistoryEntry>, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = async {
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
            history_newest_first(&mut uow, rental_id).await
        }
        .await;
        transaction::read(uow, result).await
    }
}
