//! 内存仓储
//!
//! 未配置数据库时使用，进程退出即丢失。用户名与邮箱的唯一性在同一把写锁内检查。

use std::collections::HashMap;

use application::{MessageRepository, UserRepository};
use async_trait::async_trait;
use domain::{
    ChatMessage, MessageId, RepositoryError, StoredMessage, User, UserEmail, UserId, Username,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflicts(existing: &User, candidate: &User) -> bool {
    existing.id != candidate.id
        && (existing.username == candidate.username || existing.email == candidate.email)
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) || users.values().any(|u| conflicts(u, &user)) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| conflicts(u, &user)) {
            return Err(RepositoryError::Conflict);
        }
        let slot = users.get_mut(&user.id).ok_or(RepositoryError::NotFound)?;
        *slot = user.clone();
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| &u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| &u.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

/// 按追加顺序保存的消息日志
#[derive(Default)]
pub struct InMemoryMessageRepository {
    log: RwLock<Vec<StoredMessage>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tail(mut messages: Vec<StoredMessage>, limit: u32) -> Vec<StoredMessage> {
    let skip = messages.len().saturating_sub(limit as usize);
    messages.drain(..skip);
    messages
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: ChatMessage) -> Result<StoredMessage, RepositoryError> {
        let stored = StoredMessage::from_chat(MessageId::from(Uuid::new_v4()), message);
        self.log.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<StoredMessage>, RepositoryError> {
        let log = self.log.read().await;
        Ok(log.iter().find(|m| m.id == id).cloned())
    }

    async fn list_public(&self, limit: u32) -> Result<Vec<StoredMessage>, RepositoryError> {
        let log = self.log.read().await;
        let public = log.iter().filter(|m| !m.is_private).cloned().collect();
        Ok(tail(public, limit))
    }

    async fn list_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let log = self.log.read().await;
        let conversation = log
            .iter()
            .filter(|m| m.is_conversation_between(user_a, user_b))
            .cloned()
            .collect();
        Ok(tail(conversation, limit))
    }

    async fn delete(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let mut log = self.log.write().await;
        let before = log.len();
        log.retain(|m| m.id != id);
        Ok(log.len() < before)
    }
}
