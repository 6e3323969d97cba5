//! In-memory storage implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::entities::User;
use crate::domain::traits::UserStore;

/// User store kept in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<i64, User>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StorageError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn create_user(&self, user: &User) -> Result<(), StorageError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StorageError::Duplicate(format!("user {}", user.id)));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let mut users = self.users.write().await;
        users.insert(user.id, user.clone());
        Ok(())
    }
}
