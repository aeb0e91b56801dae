//! 服务层单元测试用的内存替身

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    ChatMessage, MessageId, PasswordHash, RepositoryError, StoredMessage, User, UserEmail, UserId,
    Username,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::password::{PasswordHasher, PasswordHasherError};
use crate::repository::{MessageRepository, UserRepository};

/// 不做任何哈希，只加前缀，便于断言
pub struct PlainHasher;

#[async_trait]
impl PasswordHasher for PlainHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("plain:{plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(hashed.as_str() == format!("plain:{plaintext}"))
    }
}

#[derive(Default)]
pub struct InMemoryUsers {
    users: RwLock<HashMap<UserId, User>>,
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(user)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| &u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| &u.email == email)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryMessages {
    messages: RwLock<Vec<StoredMessage>>,
}

#[async_trait]
impl MessageRepository for InMemoryMessages {
    async fn append(&self, message: ChatMessage) -> Result<StoredMessage, RepositoryError> {
        let stored = StoredMessage::from_chat(MessageId::from(Uuid::new_v4()), message);
        self.messages.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<StoredMessage>, RepositoryError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn list_public(&self, limit: u32) -> Result<Vec<StoredMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let public: Vec<_> = messages.iter().filter(|m| !m.is_private).cloned().collect();
        let skip = public.len().saturating_sub(limit as usize);
        Ok(public.into_iter().skip(skip).collect())
    }

    async fn list_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let convo: Vec<_> = messages
            .iter()
            .filter(|m| m.is_conversation_between(user_a, user_b))
            .cloned()
            .collect();
        let skip = convo.len().saturating_sub(limit as usize);
        Ok(convo.into_iter().skip(skip).collect())
    }

    async fn delete(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|m| m.id != id);
        Ok(messages.len() != before)
    }
}
