use anyhow::Result;
use chrono::NaiveDate;

use crate::application::{ActingContext, HistoryEntry, NewRental, RentalDetails};
use crate::cli::OutputFormat;
use crate::domain::{DomainError, Rental, RentalStatus};

use super::super::Container;
use super::car_controller::car_line;

pub struct RentalController<'a> {
    container: &'a Container,
}

impl<'a> RentalController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn rent(
        &self,
        actor: &ActingContext,
        car_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        notes: Option<String>,
        format: OutputFormat,
    ) -> Result<String> {
        let rental = self
            .container
            .lifecycle_use_case()
            .create_rental(
                actor,
                NewRental {
                    car_id,
                    rental_date: from,
                    return_date: to,
                    notes,
                },
            )
            .await?;

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&rental)?,
            OutputFormat::Text => format!(
                "Rental {} booked: {} day(s), total {}.",
                rental.id(),
                rental.total_days(),
                rental.total_price()
            ),
        })
    }

    pub async fn return_car(&self, actor: &ActingContext, rental_id: i64, notes: Option<String>) -> Result<String> {
        let rental = self
            .container
            .lifecycle_use_case()
            .return_rental(actor, rental_id, notes.as_deref())
            .await?;
        Ok(format!("Rental {} completed; car {} is available again.", rental.id(), rental.car_id()))
    }

    pub async fn cancel(&self, actor: &ActingContext, rental_id: i64, notes: Option<String>) -> Result<String> {
        let rental = self
            .container
            .lifecycle_use_case()
            .cancel_rental(actor, rental_id, notes.as_deref())
            .await?;
        Ok(format!("Rental {} cancelled; car {} is available again.", rental.id(), rental.car_id()))
    }

    pub async fn list(
        &self,
        actor: &ActingContext,
        user: Option<i64>,
        status: Option<RentalStatus>,
        format: OutputFormat,
    ) -> Result<String> {
        let queries = self.container.queries_use_case();
        let rentals = match user {
            Some(user_id) if user_id != actor.user_id && !actor.is_admin() => {
                return Err(DomainError::unauthorized("only administrators can list other users' rentals").into());
            }
            Some(user_id) => queries.list_rentals_for_user(user_id).await?,
            None if actor.is_admin() => queries.list_all_rentals(status).await?,
            None => queries.list_rentals_for_user(actor.user_id).await?,
        };
        let rentals: Vec<Rental> = rentals
            .into_iter()
            .filter(|r| status.map_or(true, |s| r.status() == s))
            .collect();

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&rentals)?,
            OutputFormat::Text => self.format_rental_list(&rentals),
        })
    }

    pub async fn details(&self, actor: &ActingContext, rental_id: i64, format: OutputFormat) -> Result<String> {
        let details = self
            .container
            .queries_use_case()
            .get_rental_details(actor, rental_id)
            .await?;

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&details)?,
            OutputFormat::Text => self.format_details(&details),
        })
    }

    pub async fn history(&self, actor: &ActingContext, rental_id: i64, format: OutputFormat) -> Result<String> {
        let history = self
            .container
            .reports_use_case()
            .rental_history(actor, rental_id)
            .await?;

        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&history)?,
            OutputFormat::Text => format_history(&history),
        })
    }

    fn format_rental_list(&self, rentals: &[Rental]) -> String {
        if rentals.is_empty() {
            return "No rentals found.".to_string();
        }

        let mut output = format!("{} rentals:\n\n", rentals.len());
        for rental in rentals {
            output.push_str(&format!(
                "  [{}] car {} for user {}: {} to {} ({} days, {}) - {}\n",
                rental.id(),
                rental.car_id(),
                rental.user_id(),
                rental.rental_date(),
                rental.return_date(),
                rental.total_days(),
                rental.total_price(),
                rental.status().as_str()
            ));
        }
        output
    }

    fn format_details(&self, details: &RentalDetails) -> String {
        let rental = &details.rental;
        let mut output = format!(
            "Rental {} - {}\n  Customer: {} ({})\n  Car:\n  {}\n  Period: {} to {} ({} days)\n  Total: {}\n",
            rental.id(),
            rental.status().as_str(),
            details.user.full_name(),
            details.user.username(),
            car_line(&details.car),
            rental.rental_date(),
            rental.return_date(),
            rental.total_days(),
            rental.total_price()
        );
        if let Some(returned) = rental.actual_return_date() {
            output.push_str(&format!("  Returned: {}\n", returned.format("%Y-%m-%d %H:%M")));
        }
        if let Some(notes) = rental.notes() {
            output.push_str(&format!("  Notes: {}\n", notes));
        }
        output.push('\n');
        output.push_str(&format_history(&details.history));
        output
    }
}

fn format_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return "No history recorded.".to_string();
    }

    let mut output = "History (newest first):\n".to_string();
    for item in history {
        output.push_str(&format!(
            "  {} {} by {}",
            item.entry.action_date().format("%Y-%m-%d %H:%M"),
            item.entry.action().label(),
            item.actor_username.as_deref().unwrap_or("system")
        ));
        if let Some(notes) = item.entry.notes() {
            output.push_str(&format!(": {}", notes));
        }
        output.push('\n');
    }
    output
}
