use chrono::NaiveDate;
use clap::{Subcommand, ValueEnum};
use rust_decimal::Decimal;

use crate::domain::RentalStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the default administrator, a customer and the starter fleet on an empty store
    Seed,

    Register {
        username: String,

        email: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        full_name: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        address: Option<String>,
    },

    /// Check credentials and print the account id to use with --as
    Login {
        username: String,

        #[arg(long)]
        password: String,
    },

    /// Change the acting user's password
    Passwd {
        #[arg(long)]
        current: String,

        #[arg(long)]
        new: String,
    },

    /// List bookable cars
    Cars {
        /// Whole inventory, including rented and deactivated cars
        #[arg(long)]
        all: bool,

        /// Match brand, model or plate
        #[arg(short, long)]
        search: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    Car {
        id: i64,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Book a car for the acting user
    Rent {
        car_id: i64,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Planned return day (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    Return {
        rental_id: i64,

        #[arg(long)]
        notes: Option<String>,
    },

    Cancel {
        rental_id: i64,

        #[arg(long)]
        notes: Option<String>,
    },

    /// The acting user's rentals; administrators see everyone's
    Rentals {
        /// Only this user's rentals (administrators)
        #[arg(long)]
        user: Option<i64>,

        #[arg(long, value_parser = parse_status)]
        status: Option<RentalStatus>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    Rental {
        id: i64,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    History {
        rental_id: i64,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    #[command(subcommand)]
    Admin(AdminCommands),
}

#[derive(Subcommand)]
pub enum AdminCommands {
    AddCar {
        #[arg(long)]
        plate: String,

        #[command(flatten)]
        details: CarArgs,
    },

    /// Replace a car's details; existing rentals keep their price
    EditCar {
        id: i64,

        #[command(flatten)]
        details: CarArgs,
    },

    DeactivateCar {
        id: i64,
    },

    DeactivateUser {
        id: i64,
    },

    /// Close an active rental as completed or cancelled
    SetStatus {
        rental_id: i64,

        #[arg(value_parser = parse_status)]
        status: RentalStatus,

        #[arg(long)]
        notes: Option<String>,
    },

    Stats,

    Report {
        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(long, value_parser = parse_status)]
        status: Option<RentalStatus>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct CarArgs {
    #[arg(long)]
    pub brand: String,

    #[arg(long)]
    pub model: String,

    #[arg(long)]
    pub year: i32,

    /// Daily rate, at most two decimal places
    #[arg(long)]
    pub rate: Decimal,

    #[arg(long)]
    pub color: Option<String>,

    #[arg(long)]
    pub transmission: Option<String>,

    #[arg(long)]
    pub fuel: Option<String>,

    #[arg(long)]
    pub capacity: Option<i32>,

    #[arg(long)]
    pub description: Option<String>,
}

fn parse_status(s: &str) -> Result<RentalStatus, String> {
    RentalStatus::parse(s).ok_or_else(|| format!("unknown status '{}' (active, completed, cancelled)", s))
}
