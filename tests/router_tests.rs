//! Command routing over an in-memory container.

use std::sync::Arc;

use carrental::connector::user_message;
use carrental::{
    AdminCommands, Commands, Container, ContainerConfig, FixedClock, InMemoryRentalStore,
    OutputFormat,
};
use chrono::NaiveDate;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn container() -> Container {
    let config = ContainerConfig {
        bcrypt_cost: 4,
        ..ContainerConfig::default()
    };
    Container::with_parts(
        config,
        Arc::new(InMemoryRentalStore::new()),
        Arc::new(FixedClock::on(date(2024, 1, 1))),
    )
}

fn rent(car_id: i64, format: OutputFormat) -> Commands {
    Commands::Rent {
        car_id,
        from: date(2024, 1, 10),
        to: date(2024, 1, 13),
        notes: None,
        format,
    }
}

async fn seeded_ids(router: &carrental::Router<'_>) -> (i64, i64) {
    router.route(Commands::Seed, None).await.expect("seed");
    let admin = router
        .route(
            Commands::Login {
                username: "admin".to_string(),
                password: "Admin123!".to_string(),
            },
            None,
        )
        .await
        .expect("admin login");
    let customer = router
        .route(
            Commands::Login {
                username: "user1".to_string(),
                password: "User123!".to_string(),
            },
            None,
        )
        .await
        .expect("customer login");
    (user_id_in(&admin), user_id_in(&customer))
}

fn user_id_in(login_output: &str) -> i64 {
    login_output
        .split("--as ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|id| id.trim_end_matches(|c: char| !c.is_ascii_digit()).parse().ok())
        .expect("login output names the user id")
}

#[tokio::test]
async fn seeded_customer_can_book_and_return() {
    let container = container();
    let router = carrental::Router::new(&container);
    let (_, customer) = seeded_ids(&router).await;

    let booked = router
        .route(rent(1, OutputFormat::Json), Some(customer))
        .await
        .expect("rent");
    let rental: serde_json::Value = serde_json::from_str(&booked).expect("json output");
    assert_eq!(rental["total_days"], 3);
    let rental_id = rental["id"].as_i64().expect("rental id");

    let listed = router
        .route(
            Commands::Cars {
                all: false,
                search: None,
                format: OutputFormat::Json,
            },
            None,
        )
        .await
        .expect("cars");
    let cars: Vec<serde_json::Value> = serde_json::from_str(&listed).expect("json list");
    assert_eq!(cars.len(), 4);
    assert!(cars.iter().all(|c| c["id"].as_i64() != Some(1)));

    let returned = router
        .route(
            Commands::Return {
                rental_id,
                notes: None,
            },
            Some(customer),
        )
        .await
        .expect("return");
    assert!(returned.contains("completed"));

    let history = router
        .route(
            Commands::History {
                rental_id,
                format: OutputFormat::Json,
            },
            Some(customer),
        )
        .await
        .expect("history");
    let entries: Vec<serde_json::Value> = serde_json::from_str(&history).expect("json history");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["actor_username"], "user1");
}

#[tokio::test]
async fn commands_needing_an_actor_say_so() {
    let container = container();
    let router = carrental::Router::new(&container);
    router.route(Commands::Seed, None).await.expect("seed");

    let err = router.route(rent(1, OutputFormat::Text), None).await.unwrap_err();
    assert!(user_message(&err).contains("--as"));
}

#[tokio::test]
async fn customers_cannot_run_admin_commands() {
    let container = container();
    let router = carrental::Router::new(&container);
    let (admin, customer) = seeded_ids(&router).await;

    let err = router
        .route(Commands::Admin(AdminCommands::Stats), Some(customer))
        .await
        .unwrap_err();
    assert!(user_message(&err).starts_with("Unauthorized"));

    let stats = router
        .route(Commands::Admin(AdminCommands::Stats), Some(admin))
        .await
        .expect("stats");
    assert!(stats.contains('5'));
    assert!(stats.contains("Data Dir:       (memory)"), "{stats}");
}

#[tokio::test]
async fn double_booking_is_reported_as_unavailable() {
    let container = container();
    let router = carrental::Router::new(&container);
    let (admin, customer) = seeded_ids(&router).await;

    router
        .route(rent(2, OutputFormat::Text), Some(customer))
        .await
        .expect("first booking");
    let err = router
        .route(rent(2, OutputFormat::Text), Some(admin))
        .await
        .unwrap_err();
    let message = user_message(&err);
    assert!(message.starts_with("Invalid car_id"), "{message}");
}
