//! Storage-facing envelope around the entity model.
//!
//! Repositories stage [`Change`]s of [`Record`]s; stores apply them. The column
//! rules in [`Record::check_columns`] are the same for every storage backend.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Car, DomainError, Rental, RentalHistory, User, NOTES_MAX_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Car,
    Rental,
    RentalHistory,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Car => "cars",
            EntityKind::Rental => "rentals",
            EntityKind::RentalHistory => "rental_histories",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(User),
    Car(Car),
    Rental(Rental),
    RentalHistory(RentalHistory),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert(Record),
    Update(Record),
    Delete(EntityKind, i64),
}

impl Change {
    pub fn kind(&self) -> EntityKind {
        match self {
            Change::Insert(record) | Change::Update(record) => record.kind(),
            Change::Delete(kind, _) => *kind,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Change::Insert(record) | Change::Update(record) => record.id(),
            Change::Delete(_, id) => *id,
        }
    }

    /// History rows are append-only and rentals are closed, never deleted.
    pub fn check_permitted(&self) -> Result<(), DomainError> {
        match self {
            Change::Update(Record::RentalHistory(h)) => Err(DomainError::constraint(format!(
                "rental_histories {} is append-only and cannot be updated",
                h.id
            ))),
            Change::Delete(EntityKind::RentalHistory, id) => Err(DomainError::constraint(format!(
                "rental_histories {} is append-only and cannot be deleted",
                id
            ))),
            Change::Delete(EntityKind::Rental, id) => Err(DomainError::constraint(format!(
                "rentals {} cannot be deleted; close it instead",
                id
            ))),
            _ => Ok(()),
        }
    }
}

/// An entity type that can travel through a unit of work.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> i64;

    /// Called once, when the entity is added to a unit of work.
    fn assign_id(&mut self, id: i64);

    fn into_record(self) -> Record;

    fn from_record(record: Record) -> Option<Self>;
}

macro_rules! impl_entity {
    ($ty:ident, $kind:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn id(&self) -> i64 {
                self.id
            }

            fn assign_id(&mut self, id: i64) {
                self.id = id;
            }

            fn into_record(self) -> Record {
                Record::$kind(self)
            }

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$kind(entity) => Some(entity),
                    _ => None,
                }
            }
        }
    };
}

impl_entity!(User, User);
impl_entity!(Car, Car);
impl_entity!(Rental, Rental);
impl_entity!(RentalHistory, RentalHistory);

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::User(_) => EntityKind::User,
            Record::Car(_) => EntityKind::Car,
            Record::Rental(_) => EntityKind::Rental,
            Record::RentalHistory(_) => EntityKind::RentalHistory,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Record::User(u) => u.id,
            Record::Car(c) => c.id,
            Record::Rental(r) => r.id,
            Record::RentalHistory(h) => h.id,
        }
    }

    /// Required-field, length and precision rules for the persisted row.
    pub fn check_columns(&self) -> Result<(), DomainError> {
        if self.id() <= 0 {
            return Err(DomainError::constraint(format!(
                "{}.id must be assigned before writing",
                self.kind().table()
            )));
        }

        match self {
            Record::User(u) => {
                required("users.username", &u.username, 50)?;
                required("users.email", &u.email, 100)?;
                required("users.password_hash", &u.password_hash, 255)?;
                required("users.full_name", &u.full_name, 100)?;
                optional("users.phone_number", u.phone_number.as_deref(), 20)?;
                optional("users.address", u.address.as_deref(), 255)?;
            }
            Record::Car(c) => {
                required("cars.brand", &c.details.brand, 50)?;
                required("cars.model", &c.details.model, 50)?;
                required("cars.license_plate", &c.license_plate, 20)?;
                optional("cars.color", c.details.color.as_deref(), 30)?;
                optional("cars.transmission", c.details.transmission.as_deref(), 20)?;
                optional("cars.fuel_type", c.details.fuel_type.as_deref(), 20)?;
                optional("cars.description", c.details.description.as_deref(), 500)?;
                if !(1900..=2100).contains(&c.details.year) {
                    return Err(DomainError::constraint("cars.year must be within 1900..=2100"));
                }
                money("cars.daily_rate", c.details.daily_rate)?;
                if c.details.daily_rate <= Decimal::ZERO {
                    return Err(DomainError::constraint("cars.daily_rate must be positive"));
                }
            }
            Record::Rental(r) => {
                if r.total_days < 1 {
                    return Err(DomainError::constraint("rentals.total_days must be at least 1"));
                }
                money("rentals.total_price", r.total_price)?;
                optional("rentals.notes", r.notes.as_deref(), NOTES_MAX_LEN)?;
            }
            Record::RentalHistory(h) => {
                optional("rental_histories.notes", h.notes.as_deref(), NOTES_MAX_LEN)?;
            }
        }
        Ok(())
    }
}

fn required(column: &str, value: &str, max: usize) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::constraint(format!("{} is required", column)));
    }
    optional(column, Some(value), max)
}

fn optional(column: &str, value: Option<&str>, max: usize) -> Result<(), DomainError> {
    match value {
        Some(v) if v.chars().count() > max => Err(DomainError::constraint(format!(
            "{} exceeds {} characters",
            column, max
        ))),
        _ => Ok(()),
    }
}

/// DECIMAL(18,2): at most two fractional digits.
fn money(column: &str, value: Decimal) -> Result<(), DomainError> {
    if value.normalize().scale() > 2 {
        return Err(DomainError::constraint(format!(
            "{} has more than 2 decimal places",
            column
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CarDetails, Role};
    use chrono::Utc;

    fn car(rate: Decimal) -> Car {
        let mut car = Car::register("B 1 XYZ", CarDetails::new("Honda", "Brio", 2023, rate), Utc::now());
        car.assign_id(1);
        car
    }

    #[test]
    fn record_round_trips_entity() {
        let car = car(Decimal::from(250_000));
        let record = car.clone().into_record();
        assert_eq!(record.kind(), EntityKind::Car);
        assert_eq!(Car::from_record(record.clone()), Some(car));
        assert_eq!(User::from_record(record), None);
    }

    #[test]
    fn unassigned_id_is_rejected() {
        let user = User::new("a", "a@b.c", "hash", "A", Role::User, Utc::now());
        let err = user.into_record().check_columns().unwrap_err();
        assert!(err.is_persistence());
    }

    #[test]
    fn money_precision_is_enforced() {
        assert!(car(Decimal::new(25_000_050, 2)).into_record().check_columns().is_ok());
        let err = car(Decimal::new(1_005, 3)).into_record().check_columns().unwrap_err();
        assert!(err.root_cause().unwrap_or_default().contains("decimal places"));
    }

    #[test]
    fn trailing_zero_scale_is_not_a_precision_violation() {
        assert!(car(Decimal::new(1_000, 3)).into_record().check_columns().is_ok());
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        assert!(car(Decimal::ZERO).into_record().check_columns().is_err());
    }

    #[test]
    fn overlong_plate_is_rejected() {
        let mut c = car(Decimal::from(1));
        c.license_plate = "X".repeat(21);
        assert!(c.into_record().check_columns().is_err());
    }

    #[test]
    fn history_and_rental_removal_are_not_permitted() {
        assert!(Change::Delete(EntityKind::RentalHistory, 1).check_permitted().is_err());
        assert!(Change::Delete(EntityKind::Rental, 1).check_permitted().is_err());
        assert!(Change::Delete(EntityKind::Car, 1).check_permitted().is_ok());
        assert!(Change::Update(car(Decimal::from(1)).into_record()).check_permitted().is_ok());
    }
}
