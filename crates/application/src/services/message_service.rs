//! 历史消息服务
//!
//! 消息存储的读取端以及 HTTP 写入路径。实时中继不经过这里，
//! 它直接把消息交给持久化队列。

use std::sync::Arc;

use domain::{ChatMessage, DomainError, MessageId, MessageText, StoredMessage, UserId};

use crate::{
    clock::Clock, error::ApplicationError, repository::MessageRepository,
    repository::UserRepository,
};

pub const DEFAULT_HISTORY_LIMIT: u32 = 100;
pub const MAX_HISTORY_LIMIT: u32 = 500;

#[derive(Debug, Clone)]
pub struct CreateMessageRequest {
    pub text: String,
    pub recipient_id: Option<UserId>,
    pub is_private: bool,
}

pub struct MessageServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
}

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    /// 公共消息，按时间升序
    pub async fn public_history(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<StoredMessage>, ApplicationError> {
        Ok(self
            .deps
            .message_repository
            .list_public(clamp_limit(limit))
            .await?)
    }

    /// 两个用户之间的私聊记录，请求者必须是其中一方
    pub async fn private_history(
        &self,
        requester: UserId,
        user_a: UserId,
        user_b: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<StoredMessage>, ApplicationError> {
        if requester != user_a && requester != user_b {
            return Err(ApplicationError::Domain(DomainError::OperationNotAllowed));
        }
        Ok(self
            .deps
            .message_repository
            .list_conversation(user_a, user_b, clamp_limit(limit))
            .await?)
    }

    pub async fn create_message(
        &self,
        sender_id: UserId,
        request: CreateMessageRequest,
    ) -> Result<StoredMessage, ApplicationError> {
        let sender = self
            .deps
            .user_repository
            .find_by_id(sender_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::UserNotFound))?;
        let text = MessageText::parse(request.text)?;
        let now = self.deps.clock.now();

        let message = if request.is_private {
            let recipient_id = request.recipient_id.ok_or_else(|| {
                DomainError::invalid_argument("recipientId", "private message requires a recipient")
            })?;
            if self
                .deps
                .user_repository
                .find_by_id(recipient_id)
                .await?
                .is_none()
            {
                return Err(ApplicationError::Domain(DomainError::UserNotFound));
            }
            ChatMessage::private(
                sender.id,
                sender.username.as_str(),
                recipient_id,
                text.into_inner(),
                now,
            )
        } else {
            ChatMessage::public(sender.id, sender.username.as_str(), text.into_inner(), now)
        };

        let stored = self.deps.message_repository.append(message).await?;
        tracing::debug!(message_id = %stored.id, sender_id = %sender_id, "message stored via http");
        Ok(stored)
    }

    /// 只有发送者本人可以删除
    pub async fn delete_message(
        &self,
        requester: UserId,
        id: MessageId,
    ) -> Result<(), ApplicationError> {
        let message = self
            .deps
            .message_repository
            .find_by_id(id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::MessageNotFound))?;
        if message.sender_id != requester {
            return Err(ApplicationError::Domain(DomainError::OperationNotAllowed));
        }

        if !self.deps.message_repository.delete(id).await? {
            return Err(ApplicationError::Domain(DomainError::MessageNotFound));
        }
        tracing::info!(message_id = %id, user_id = %requester, "消息已删除");
        Ok(())
    }
}
