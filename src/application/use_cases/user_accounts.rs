use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::transaction;
use crate::application::{ActingContext, Clock, RentalStore, TransactionOptions, UnitOfWork};
use crate::domain::{Car, CarDetails, DomainError, Role, User};

const MIN_PASSWORD_LEN: usize = 6;

/// Input for self-registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

/// What [`UserAccountsUseCase::seed_defaults`] created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub users: usize,
    pub cars: usize,
}

/// Registration, credentials and account lifecycle.
pub struct UserAccountsUseCase {
    store: Arc<dyn RentalStore>,
    clock: Arc<dyn Clock>,
    bcrypt_cost: u32,
    options: TransactionOptions,
}

impl UserAccountsUseCase {
    pub fn new(store: Arc<dyn RentalStore>, clock: Arc<dyn Clock>, bcrypt_cost: u32) -> Self {
        Self {
            store,
            clock,
            bcrypt_cost,
            options: TransactionOptions::default(),
        }
    }

    pub fn with_transaction_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn register(&self, new_user: NewUser) -> Result<User, DomainError> {
        let username = new_user.username.trim().to_string();
        let email = new_user.email.trim().to_lowercase();
        validate_registration(&username, &email, &new_user.password)?;

        let full_name = new_user
            .full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&username)
            .to_string();
        if full_name.chars().count() > 100 {
            return Err(DomainError::validation("full_name", "exceeds 100 characters"));
        }

        let password_hash = self.hash_password(new_user.password).await?;

        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = async {
            if uow.users().any(|u| u.username().eq_ignore_ascii_case(&username)).await? {
                return Err(DomainError::validation("username", "is already taken"));
            }
            if uow.users().any(|u| u.email().eq_ignore_ascii_case(&email)).await? {
                return Err(DomainError::validation("email", "is already registered"));
            }

            let user = User::new(
                username.clone(),
                email.clone(),
                password_hash,
                full_name,
                Role::User,
                self.clock.now(),
            )
            .with_contact(new_user.phone_number, new_user.address);
            uow.users().add(user).await
        }
        .await;
        let user = transaction::finish(uow, result, "register").await?;

        info!("User {} registered as {}", user.id(), user.username());
        Ok(user)
    }

    /// Verifies credentials of an active account.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, DomainError> {
        let username = username.trim().to_string();
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = uow
            .users()
            .first_matching(|u| u.is_active() && u.username() == username)
            .await;
        let user = transaction::read(uow, result).await?;

        let denied = || DomainError::unauthorized("invalid username or password");
        let user = user.ok_or_else(denied)?;
        if !self.verify_password(password, user.password_hash()).await? {
            warn!("Failed login for {}", username);
            return Err(denied());
        }

        debug!("User {} authenticated", user.id());
        Ok(user)
    }

    pub async fn change_password(
        &self,
        actor: &ActingContext,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), DomainError> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(
                "new_password",
                format!("must be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }

        let user = self.load_active(actor.user_id).await?;
        if !self.verify_password(current_password, user.password_hash()).await? {
            return Err(DomainError::validation("current_password", "does not match"));
        }
        let password_hash = self.hash_password(new_password.to_string()).await?;

        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = async {
            let mut current = uow
                .users()
                .get_by_id(user.id())
                .await?
                .ok_or_else(|| DomainError::not_found(format!("user {}", user.id())))?;
            if !current.is_active() {
                return Err(DomainError::unauthorized(format!("user {} is inactive", user.id())));
            }
            if current.password_hash() != user.password_hash() {
                return Err(DomainError::concurrency(format!(
                    "password of user {} changed concurrently",
                    user.id()
                )));
            }
            current.change_password_hash(password_hash, self.clock.now());
            uow.users().update(current)
        }
        .await;
        transaction::finish(uow, result, "change_password").await?;

        info!("User {} changed their password", actor.user_id);
        Ok(())
    }

    /// Soft delete of an account. Its rentals stay readable.
    pub async fn deactivate_user(&self, actor: &ActingContext, user_id: i64) -> Result<User, DomainError> {
        actor.require_admin()?;
        if actor.user_id == user_id {
            return Err(DomainError::validation("user_id", "administrators cannot deactivate themselves"));
        }

        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = async {
            let mut user = uow
                .users()
                .get_by_id(user_id)
                .await?
                .ok_or_else(|| DomainError::not_found(format!("user {}", user_id)))?;
            user.deactivate(self.clock.now());
            uow.users().update(user.clone())?;
            Ok::<_, DomainError>(user)
        }
        .await;
        let user = transaction::finish(uow, result, "deactivate_user").await?;

        info!("User {} deactivated", user.id());
        Ok(user)
    }

    /// Resolves who is acting. Unknown or inactive accounts cannot act.
    pub async fn acting_as(&self, user_id: i64) -> Result<ActingContext, DomainError> {
        let user = self.load_active(user_id).await?;
        Ok(ActingContext::of(&user))
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, DomainError> {
        let mut uow = UnitOfWork::open_read_only(self.store.as_ref()).await?;
        let result = uow.users().get_by_id(user_id).await;
        transaction::read(uow, result).await
    }

    /// Creates the default administrator, one customer and the starter fleet.
    /// Does nothing once any user exists.
    pub async fn seed_defaults(&self) -> Result<SeedSummary, DomainError> {
        let admin_hash = self.hash_password("Admin123!".to_string()).await?;
        let customer_hash = self.hash_password("User123!".to_string()).await?;
        let now = self.clock.now();

        let mut uow = transaction::begin(self.store.as_ref(), self.options).await?;
        let result = async {
            if uow.users().count_all().await? > 0 {
                return Ok(SeedSummary { users: 0, cars: 0 });
            }

            let admin = User::new("admin", "admin@carrental.com", admin_hash, "Administrator", Role::Admin, now)
                .with_contact(Some("081234567890".to_string()), None);
            let customer = User::new("user1", "user1@example.com", customer_hash, "John Doe", Role::User, now)
                .with_contact(Some("081234567891".to_string()), None);
            uow.users().add(admin).await?;
            uow.users().add(customer).await?;

            let fleet = default_fleet();
            let cars = fleet.len();
            for (plate, details) in fleet {
                uow.cars().add(Car::register(plate, details, now)).await?;
            }

            Ok::<_, DomainError>(SeedSummary { users: 2, cars })
        }
        .await;
        let summary = transaction::finish(uow, result, "seed_defaults").await?;

        if summary.users > 0 {
            info!("Seeded {} users and {} cars", summary.users, summary.cars);
        } else {
            debug!("Store already has users; seeding skipped");
        }
        Ok(summary)
    }

    async fn load_active(&self, user_id: i64) -> Result<User, DomainError> {
        let user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("user {}", user_id)))?;
        if !user.is_active() {
            return Err(DomainError::unauthorized(format!("user {} is inactive", user_id)));
        }
        Ok(user)
    }

    async fn hash_password(&self, password: String) -> Result<String, DomainError> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| DomainError::internal(format!("password hashing task failed: {}", e)))?
            .map_err(|e| DomainError::internal(format!("failed to hash password: {}", e)))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, DomainError> {
        let password = password.to_string();
        let hash = hash.to_string();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| DomainError::internal(format!("password check task failed: {}", e)))?;
        // A malformed stored hash is a failed login, not an outage.
        Ok(verified.unwrap_or(false))
    }
}

fn validate_registration(username: &str, email: &str, password: &str) -> Result<(), DomainError> {
    let name_len = username.chars().count();
    if !(3..=50).contains(&name_len) {
        return Err(DomainError::validation("username", "must be 3 to 50 characters"));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(DomainError::validation(
            "username",
            "may only contain letters, digits, '_' and '.'",
        ));
    }
    if email.chars().count() > 100 || !looks_like_email(email) {
        return Err(DomainError::validation("email", "is not a valid address"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

fn default_fleet() -> Vec<(&'static str, CarDetails)> {
    let car = |brand: &str,
               model: &str,
               year: i32,
               rate: i64,
               color: &str,
               transmission: &str,
               fuel: &str,
               capacity: i32,
               description: &str| {
        let mut details = CarDetails::new(brand, model, year, Decimal::from(rate));
        details.color = Some(color.to_string());
        details.transmission = Some(transmission.to_string());
        details.fuel_type = Some(fuel.to_string());
        details.capacity = Some(capacity);
        details.description = Some(description.to_string());
        details
    };

    vec![
        ("B 1234 ABC", car("Toyota", "Avanza", 2022, 300_000, "Silver", "Manual", "Petrol", 7, "Comfortable family MPV")),
        ("B 5678 DEF", car("Honda", "Brio", 2023, 250_000, "White", "Automatic", "Petrol", 5, "Economical, nimble city car")),
        ("B 9012 GHI", car("Mitsubishi", "Xpander", 2022, 350_000, "Black", "Automatic", "Petrol", 7, "Modern, stylish MPV")),
        ("B 3456 JKL", car("Daihatsu", "Terios", 2021, 320_000, "Red", "Manual", "Petrol", 7, "Rugged SUV for any terrain")),
        ("B 7890 MNO", car("Toyota", "Innova", 2023, 400_000, "Gray", "Automatic", "Diesel", 8, "Premium MPV for long trips")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_rules_name_the_field() {
        assert!(validate_registration("budi_s", "budi@example.com", "secret1").is_ok());
        assert_eq!(
            validate_registration("ab", "budi@example.com", "secret1").unwrap_err().field(),
            Some("username")
        );
        assert_eq!(
            validate_registration("budi", "budi@example", "secret1").unwrap_err().field(),
            Some("email")
        );
        assert_eq!(
            validate_registration("budi", "budi@example.com", "123").unwrap_err().field(),
            Some("password")
        );
    }

    #[test]
    fn default_fleet_has_unique_plates() {
        let fleet = default_fleet();
        let mut plates: Vec<_> = fleet.iter().map(|(p, _)| *p).collect();
        plates.sort();
        plates.dedup();
        assert_eq!(plates.len(), 5);
    }
}
