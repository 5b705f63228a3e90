use anyhow::Result;

use crate::cli::OutputFormat;
use crate::domain::{Car, DomainError};

use super::super::Container;

pub struct CarController<'a> {
    container: &'a Container,
}

impl<'a> CarController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn list(&self, all: bool, search: Option<String>, format: OutputFormat) -> Result<String> {
        let cars = match (all, search) {
            (_, Some(term)) => self.container.inventory_use_case().search_cars(&term).await?,
            (true, None) => self.container.inventory_use_case().list_cars(true).await?,
            (false, None) => self.container.queries_use_case().get_available_cars().await?,
        };

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&cars)?,
            OutputFormat::Text => self.format_car_list(&cars),
        })
    }

    pub async fn show(&self, id: i64, format: OutputFormat) -> Result<String> {
        let car = self
            .container
            .queries_use_case()
            .get_car_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("car {}", id)))?;

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&car)?,
            OutputFormat::Text => self.format_car(&car),
        })
    }

    fn format_car_list(&self, cars: &[Car]) -> String {
        if cars.is_empty() {
            return "No cars found.".to_string();
        }

        let mut output = format!("{} cars:\n\n", cars.len());
        for car in cars {
            output.push_str(&car_line(car));
            output.push('\n');
        }
        output
    }

    fn format_car(&self, car: &Car) -> String {
        let details = car.details();
        let mut output = car_line(car);
        output.push('\n');
        let extras = [
            ("Color", details.color.clone()),
            ("Transmission", details.transmission.clone()),
            ("Fuel", details.fuel_type.clone()),
            ("Seats", details.capacity.map(|c| c.to_string())),
            ("About", details.description.clone()),
        ];
        for (label, value) in extras {
            if let Some(value) = value {
                output.push_str(&format!("    {}: {}\n", label, value));
            }
        }
        output
    }
}

pub(super) fn car_line(car: &Car) -> String {
    format!(
        "  [{}] {} - {} - {}/day - {}{}",
        car.id(),
        car.display_name(),
        car.license_plate(),
        car.daily_rate(),
        car.status().as_str(),
        if car.is_active() { "" } else { " (deactivated)" }
    )
}
