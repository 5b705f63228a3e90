use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Car, DomainError};

/// Longest bookable period, in days.
pub const MAX_RENTAL_DAYS: i64 = 30;

/// Column limit shared by rental and history notes.
pub const NOTES_MAX_LEN: usize = 500;

const RETURN_NOTE_SEPARATOR: &str = " | Return: ";
const CANCEL_NOTE_PREFIX: &str = "Cancelled: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Active => "active",
            RentalStatus::Completed => "completed",
            RentalStatus::Cancelled => "cancelled",
        }
    }

    /// Unknown labels are `None`; a typo must never become a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(RentalStatus::Active),
            "completed" => Some(RentalStatus::Completed),
            "cancelled" | "canceled" => Some(RentalStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RentalStatus::Active)
    }
}

/// A validated booking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalPeriod {
    rental_date: NaiveDate,
    return_date: NaiveDate,
}

impl RentalPeriod {
    pub fn new(
        rental_date: NaiveDate,
        return_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, DomainError> {
        if rental_date < today {
            return Err(DomainError::validation(
                "rental_date",
                format!("{} is before today ({})", rental_date, today),
            ));
        }
        if return_date <= rental_date {
            return Err(DomainError::validation(
                "return_date",
                "must be later than the rental date",
            ));
        }
        let days = (return_date - rental_date).num_days();
        if days > MAX_RENTAL_DAYS {
            return Err(DomainError::validation(
                "return_date",
                format!("rental period of {} days exceeds {} days", days, MAX_RENTAL_DAYS),
            ));
        }

        Ok(Self {
            rental_date,
            return_date,
        })
    }

    pub fn rental_date(&self) -> NaiveDate {
        self.rental_date
    }

    pub fn return_date(&self) -> NaiveDate {
        self.return_date
    }

    pub fn total_days(&self) -> i32 {
        (self.return_date - self.rental_date).num_days() as i32
    }

    pub fn price(&self, daily_rate: Decimal) -> Decimal {
        Decimal::from(self.total_days()) * daily_rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    pub(crate) id: i64,
    pub(crate) user_id: i64,
    pub(crate) car_id: i64,
    pub(crate) rental_date: NaiveDate,
    pub(crate) return_date: NaiveDate,
    pub(crate) actual_return_date: Option<DateTime<Utc>>,
    pub(crate) total_days: i32,
    pub(crate) total_price: Decimal,
    pub(crate) status: RentalStatus,
    pub(crate) notes: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl Rental {
    /// Opens an active rental, pricing it once from the car's current daily rate.
    pub fn open(
        user_id: i64,
        car: &Car,
        period: RentalPeriod,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let notes = clean_notes(notes);
        check_notes_len(notes.as_deref())?;

        Ok(Self {
            id: 0,
            user_id,
            car_id: car.id(),
            rental_date: period.rental_date(),
            return_date: period.return_date(),
            actual_return_date: None,
            total_days: period.total_days(),
            total_price: period.price(car.daily_rate()),
            status: RentalStatus::Active,
            notes,
            created_at: now,
            updated_at: None,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn car_id(&self) -> i64 {
        self.car_id
    }

    pub fn rental_date(&self) -> NaiveDate {
        self.rental_date
    }

    pub fn return_date(&self) -> NaiveDate {
        self.return_date
    }

    pub fn actual_return_date(&self) -> Option<DateTime<Utc>> {
        self.actual_return_date
    }

    pub fn total_days(&self) -> i32 {
        self.total_days
    }

    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    pub fn status(&self) -> RentalStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == RentalStatus::Active
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }

    /// Active → Completed. Return notes are appended, never overwrite earlier notes.
    pub fn complete(&mut self, now: DateTime<Utc>, notes: Option<&str>) -> Result<(), DomainError> {
        self.ensure_active()?;
        let notes = match clean_notes(notes) {
            Some(extra) => Some(match self.notes.as_deref() {
                Some(existing) => format!("{}{}{}", existing, RETURN_NOTE_SEPARATOR, extra),
                None => extra,
            }),
            None => self.notes.clone(),
        };
        check_notes_len(notes.as_deref())?;

        self.status = RentalStatus::Completed;
        self.actual_return_date = Some(now);
        self.notes = notes;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Active → Cancelled. Cancellation notes are prefixed and appended.
    pub fn cancel(&mut self, now: DateTime<Utc>, notes: Option<&str>) -> Result<(), DomainError> {
        self.ensure_active()?;
        let notes = match clean_notes(notes) {
            Some(extra) => Some(match self.notes.as_deref() {
                Some(existing) => format!("{} | {}{}", existing, CANCEL_NOTE_PREFIX, extra),
                None => format!("{}{}", CANCEL_NOTE_PREFIX, extra),
            }),
            None => self.notes.clone(),
        };
        check_notes_len(notes.as_deref())?;

        self.status = RentalStatus::Cancelled;
        self.notes = notes;
        self.updated_at = Some(now);
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DomainError::validation(
                "status",
                format!("rental {} is already {}", self.id, self.status.as_str()),
            ))
        }
    }
}

fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

fn check_notes_len(notes: Option<&str>) -> Result<(), DomainError> {
    match notes {
        Some(n) if n.chars().count() > NOTES_MAX_LEN => Err(DomainError::validation(
            "notes",
            format!("notes exceed {} characters", NOTES_MAX_LEN),
        )),
        _ => Ok(()),
    }
}
