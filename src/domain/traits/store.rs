use async_trait::async_trait;
use crate::application::errors::StorageError;
use crate::domain::entities::User;

/// Store trait - abstraction for user persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError>;

    /// Insert a new user; fails with `StorageError::Duplicate` if the id exists
    async fn create_user(&self, user: &User) -> Result<(), StorageError>;

    async fn update_user(&self, user: &User) -> Result<(), StorageError>;
}
