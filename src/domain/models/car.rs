use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Occupancy of a car. `Rented` holds exactly while an active rental references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CarStatus {
    #[default]
    Available,
    Rented,
}

impl CarStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::Available => "available",
            CarStatus::Rented => "rented",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(CarStatus::Available),
            "rented" => Some(CarStatus::Rented),
            _ => None,
        }
    }
}

/// Editable attributes of a car. The license plate is fixed at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarDetails {
    pub brand: String,
    pub model: String,
    pub year: i32,
    pub daily_rate: Decimal,
    pub color: Option<String>,
    pub transmission: Option<String>,
    pub fuel_type: Option<String>,
    pub capacity: Option<i32>,
    pub description: Option<String>,
}

impl CarDetails {
    pub fn new(brand: impl Into<String>, model: impl Into<String>, year: i32, daily_rate: Decimal) -> Self {
        Self {
            brand: brand.into(),
            model: model.into(),
            year,
            daily_rate,
            color: None,
            transmission: None,
            fuel_type: None,
            capacity: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub(crate) id: i64,
    pub(crate) license_plate: String,
    pub(crate) details: CarDetails,
    pub(crate) status: CarStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) is_active: bool,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub(crate) version: i64,
}

impl Car {
    pub fn register(license_plate: impl Into<String>, details: CarDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            license_plate: license_plate.into(),
            details,
            status: CarStatus::Available,
            created_at: now,
            updated_at: None,
            is_active: true,
            version: 0,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn license_plate(&self) -> &str {
        &self.license_plate
    }

    pub fn details(&self) -> &CarDetails {
        &self.details
    }

    pub fn brand(&self) -> &str {
        &self.details.brand
    }

    pub fn model(&self) -> &str {
        &self.details.model
    }

    pub fn year(&self) -> i32 {
        self.details.year
    }

    pub fn daily_rate(&self) -> Decimal {
        self.details.daily_rate
    }

    pub fn status(&self) -> CarStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn display_name(&self) -> String {
        format!("{} {} ({})", self.details.brand, self.details.model, self.details.year)
    }

    /// Bookable right now: listed and not occupied.
    pub fn is_available(&self) -> bool {
        self.is_active && self.status == CarStatus::Available
    }

    pub fn mark_rented(&mut self, now: DateTime<Utc>) {
        self.status = CarStatus::Rented;
        self.updated_at = Some(now);
    }

    pub fn mark_available(&mut self, now: DateTime<Utc>) {
        self.status = CarStatus::Available;
        self.updated_at = Some(now);
    }

    pub fn revise(&mut self, details: CarDetails, now: DateTime<Utc>) {
        self.details = details;
        self.updated_at = Some(now);
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = Some(now);
    }

    pub fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.details.brand.to_lowercase().contains(&term)
            || self.details.model.to_lowercase().contains(&term)
            || self.license_plate.to_lowercase().contains(&term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avanza() -> Car {
        Car::register(
            "B 1234 ABC",
            CarDetails::new("Toyota", "Avanza", 2022, Decimal::from(300_000)),
            Utc::now(),
        )
    }

    #[test]
    fn new_car_is_available() {
        let car = avanza();
        assert_eq!(car.status(), CarStatus::Available);
        assert!(car.is_available());
        assert_eq!(car.display_name(), "Toyota Avanza (2022)");
    }

    #[test]
    fn inactive_car_is_not_available() {
        let mut car = avanza();
        car.deactivate(Utc::now());
        assert!(!car.is_available());
    }

    #[test]
    fn term_matches_brand_model_or_plate() {
        let car = avanza();
        assert!(car.matches_term("toyota"));
        assert!(car.matches_term("AVAN"));
        assert!(car.matches_term("1234"));
        assert!(!car.matches_term("honda"));
    }

    #[test]
    fn status_round_trips_through_label() {
        assert_eq!(CarStatus::parse(CarStatus::Rented.as_str()), Some(CarStatus::Rented));
        assert_eq!(CarStatus::parse("AVAILABLE"), Some(CarStatus::Available));
        assert_eq!(CarStatus::parse("availble"), None);
    }
}
