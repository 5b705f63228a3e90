use anyhow::{bail, Result};

use crate::application::{ActingContext, NewUser};

use super::super::Container;

pub struct AccountController<'a> {
    container: &'a Container,
}

impl<'a> AccountController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    /// Resolves the `--as` user into an acting context.
    pub async fn actor(&self, acting_user: Option<i64>) -> Result<ActingContext> {
        let Some(user_id) = acting_user else {
            bail!("this command needs --as <user-id> (see `carrental login`)");
        };
        Ok(self.container.accounts_use_case().acting_as(user_id).await?)
    }

    pub async fn seed(&self) -> Result<String> {
        let summary = self.container.accounts_use_case().seed_defaults().await?;
        if summary.users == 0 {
            return Ok("Store already has accounts; nothing seeded.".to_string());
        }
        Ok(format!(
            "Seeded {} users and {} cars.\n  admin / Admin123!\n  user1 / User123!",
            summary.users, summary.cars
        ))
    }

    pub async fn register(
        &self,
        username: String,
        email: String,
        password: String,
        full_name: Option<String>,
        phone_number: Option<String>,
        address: Option<String>,
    ) -> Result<String> {
        let user = self
            .container
            .accounts_use_case()
            .register(NewUser {
                username,
                email,
                password,
                full_name,
                phone_number,
                address,
            })
            .await?;
        Ok(format!("Registered {} (id {}).", user.username(), user.id()))
    }

    pub async fn login(&self, username: String, password: String) -> Result<String> {
        let user = self
            .container
            .accounts_use_case()
            .authenticate(&username, &password)
            .await?;
        Ok(format!(
            "Welcome, {}. You are user {} ({}); pass --as {} to act as this account.",
            user.full_name(),
            user.id(),
            user.role().as_str(),
            user.id()
        ))
    }

    pub async fn change_password(
        &self,
        actor: &ActingContext,
        current: String,
        new: String,
    ) -> Result<String> {
        self.container
            .accounts_use_case()
            .change_password(actor, &current, &new)
            .await?;
        Ok("Password changed.".to_string())
    }
}
