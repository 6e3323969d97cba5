use std::sync::Arc;

use tracing::info;

use crate::application::errors::{BotError, StorageError};
use crate::domain::entities::User;
use crate::domain::traits::UserStore;

/// Service for user registration and account lifecycle
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Register a user, or return the existing record if the id is known
    pub async fn register_user(
        &self,
        id: i64,
        username: Option<&str>,
        first_name: &str,
        last_name: Option<&str>,
    ) -> Result<User, BotError> {
        if let Some(existing) = self.store.get_user(id).await? {
            return Ok(existing);
        }

        let user = User::new(id, first_name)
            .with_username(username)
            .with_last_name(last_name);
        user.validate()?;

        match self.store.create_user(&user).await {
            Ok(()) => {
                info!(user_id = id, "Registered new user");
                Ok(user)
            }
            // Lost a race with a concurrent registration of the same id
            Err(StorageError::Duplicate(_)) => self.get_user(id).await,
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_user(&self, id: i64) -> Result<User, BotError> {
        self.store
            .get_user(id)
            .await?
            .ok_or(BotError::UserNotFound(id))
    }

    /// Move an inactive user onto the free trial
    pub async fn activate_trial(&self, id: i64) -> Result<User, BotError> {
        let mut user = self.get_user(id).await?;
        if !user.can_activate_trial() {
            return Err(BotError::AlreadyActive(id));
        }

        user.activate_trial();
        self.store.update_user(&user).await?;
        info!(user_id = id, quota_limit = user.quota_limit, "Trial activated");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::UserStatus;
    use crate::infrastructure::storage::MemoryStore;

    fn service() -> UserService {
        UserService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let service = service();
        let first = service
            .register_user(42, Some("ann"), "Ann", None)
            .await
            .unwrap();
        let second = service
            .register_user(42, Some("other"), "Other", Some("Name"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.username.as_deref(), Some("ann"));
        assert_eq!(second.status, UserStatus::Inactive);
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let err = service().register_user(7, None, "  ", None).await.unwrap_err();
        assert!(matches!(err, BotError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let err = service().get_user(9).await.unwrap_err();
        assert!(matches!(err, BotError::UserNotFound(9)));
    }

    #[tokio::test]
    async fn test_trial_activates_once() {
        let service = service();
        service.register_user(5, None, "Bo", None).await.unwrap();

        let user = service.activate_trial(5).await.unwrap();
        assert_eq!(user.status, UserStatus::Trial);
        assert!(service.get_user(5).await.unwrap().is_active());

        let err = service.activate_trial(5).await.unwrap_err();
        assert!(matches!(err, BotError::AlreadyActive(5)));
    }
}
