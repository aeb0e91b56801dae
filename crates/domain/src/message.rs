//! 聊天消息
//!
//! `ChatMessage` 是中继在内存中构造的瞬时形态；`StoredMessage` 是消息存储返回的持久化记录。

use serde::{Deserialize, Serialize};

use crate::events::{MessageDelivery, OutboundEvent};
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 中继构造的聊天消息（线上形态）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: String,
    pub recipient_id: Option<UserId>,
    pub is_private: bool,
    pub timestamp: Timestamp,
}

impl ChatMessage {
    pub fn public(
        sender_id: UserId,
        sender_name: impl Into<String>,
        text: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sender_id,
            sender_name: sender_name.into(),
            text: text.into(),
            recipient_id: None,
            is_private: false,
            timestamp,
        }
    }

    pub fn private(
        sender_id: UserId,
        sender_name: impl Into<String>,
        recipient_id: UserId,
        text: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sender_id,
            sender_name: sender_name.into(),
            text: text.into(),
            recipient_id: Some(recipient_id),
            is_private: true,
            timestamp,
        }
    }

    pub fn delivery(&self) -> MessageDelivery {
        MessageDelivery {
            sender_id: self.sender_id,
            sender_name: self.sender_name.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp,
        }
    }

    /// 转换为投递给连接的出站事件
    pub fn to_outbound(&self) -> OutboundEvent {
        if self.is_private {
            OutboundEvent::PrivateMessage(self.delivery())
        } else {
            OutboundEvent::PublicMessage(self.delivery())
        }
    }
}

/// 消息存储中的持久化记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub recipient_id: Option<UserId>,
    pub text: String,
    pub is_private: bool,
    pub created_at: Timestamp,
}

impl StoredMessage {
    pub fn from_chat(id: MessageId, message: ChatMessage) -> Self {
        Self {
            id,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            recipient_id: message.recipient_id,
            text: message.text,
            is_private: message.is_private,
            created_at: message.timestamp,
        }
    }

    /// 是否属于 a 与 b 之间的私聊（任一方向）
    pub fn is_conversation_between(&self, a: UserId, b: UserId) -> bool {
        self.is_private
            && ((self.sender_id == a && self.recipient_id == Some(b))
                || (self.sender_id == b && self.recipient_id == Some(a)))
    }
}
