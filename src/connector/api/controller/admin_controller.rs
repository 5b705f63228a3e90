use anyhow::Result;
use chrono::NaiveDate;

use crate::application::{ActingContext, DashboardStats, NewCar, ReportFilter, RentalReportRow};
use crate::cli::{CarArgs, OutputFormat};
use crate::domain::{CarDetails, RentalStatus};

use super::super::Container;

pub struct AdminController<'a> {
    container: &'a Container,
}

impl<'a> AdminController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn add_car(&self, actor: &ActingContext, plate: String, args: CarArgs) -> Result<String> {
        let car = self
            .container
            .inventory_use_case()
            .add_car(
                actor,
                NewCar {
                    license_plate: plate,
                    details: car_details(args),
                },
            )
            .await?;
        Ok(format!("Car {} added: {} [{}].", car.id(), car.display_name(), car.license_plate()))
    }

    pub async fn edit_car(&self, actor: &ActingContext, id: i64, args: CarArgs) -> Result<String> {
        let car = self
            .container
            .inventory_use_case()
            .edit_car(actor, id, car_details(args))
            .await?;
        Ok(format!("Car {} updated: {} at {}/day.", car.id(), car.display_name(), car.daily_rate()))
    }

    pub async fn deactivate_car(&self, actor: &ActingContext, id: i64) -> Result<String> {
        let car = self.container.inventory_use_case().deactivate_car(actor, id).await?;
        Ok(format!("Car {} ({}) deactivated.", car.id(), car.license_plate()))
    }

    pub async fn deactivate_user(&self, actor: &ActingContext, id: i64) -> Result<String> {
        let user = self.container.accounts_use_case().deactivate_user(actor, id).await?;
        Ok(format!("User {} ({}) deactivated.", user.id(), user.username()))
    }

    pub async fn set_status(
        &self,
        actor: &ActingContext,
        rental_id: i64,
        status: RentalStatus,
        notes: Option<String>,
    ) -> Result<String> {
        let rental = self
            .container
            .lifecycle_use_case()
            .admin_update_status(actor, rental_id, status, notes.as_deref())
            .await?;
        Ok(format!("Rental {} is now {}.", rental.id(), rental.status().as_str()))
    }

    pub async fn stats(&self, actor: &ActingContext) -> Result<String> {
        let stats = self.container.reports_use_case().dashboard(actor).await?;
        Ok(self.format_stats(&stats))
    }

    pub async fn report(
        &self,
        actor: &ActingContext,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        status: Option<RentalStatus>,
        format: OutputFormat,
    ) -> Result<String> {
        let rows = self
            .container
            .reports_use_case()
            .rental_report(actor, ReportFilter { from, to, status })
            .await?;

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&rows)?,
            OutputFormat::Text => self.format_report(&rows),
        })
    }

    fn format_stats(&self, stats: &DashboardStats) -> String {
        format!(
            "Car Rental Statistics\n=====================\nCars:           {}\nAvailable:      {}\nRented:         {}\nActive rentals: {}\nData Dir:       {}",
            stats.total_cars,
            stats.available_cars,
            stats.rented_cars,
            stats.active_rentals,
            if self.container.memory_storage() { "(memory)" } else { self.container.data_dir() }
        )
    }

    fn format_report(&self, rows: &[RentalReportRow]) -> String {
        if rows.is_empty() {
            return "No rentals match.".to_string();
        }

        let mut output = format!("{} rentals:\n\n", rows.len());
        for row in rows {
            output.push_str(&format!(
                "  [{}] {} ({}) - {} [{}] - {} to {} - {} days - {} - {}\n",
                row.rental_id,
                row.full_name,
                row.username,
                row.car,
                row.license_plate,
                row.rental_date,
                row.return_date,
                row.total_days,
                row.total_price,
                row.status.as_str()
            ));
        }
        output
    }
}

fn car_details(args: CarArgs) -> CarDetails {
    let mut details = CarDetails::new(args.brand, args.model, args.year, args.rate);
    details.color = args.color;
    details.transmission = args.transmission;
    details.fuel_type = args.fuel;
    details.capacity = args.capacity;
    details.description = args.description;
    details
}
