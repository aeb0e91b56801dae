//! 中继进出事件
//!
//! 入站事件由传输层解析后交给中继；出站事件由中继产生并推送到连接。
//! 两者都是封闭枚举，状态机分发时可以被穷尽检查。

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::value_objects::{Timestamp, UserId};

/// 入站事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Join(Identity),
    SendPublic { text: String },
    SendPrivate { recipient_id: UserId, text: String },
    Disconnect,
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Join(_) => "join",
            InboundEvent::SendPublic { .. } => "sendPublic",
            InboundEvent::SendPrivate { .. } => "sendPrivate",
            InboundEvent::Disconnect => "disconnect",
        }
    }
}

/// 投递给客户端的消息载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelivery {
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: String,
    pub timestamp: Timestamp,
}

/// 出站事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    #[serde(rename = "presence.snapshot")]
    PresenceSnapshot { users: Vec<Identity> },
    #[serde(rename = "presence.joined")]
    PresenceJoined(Identity),
    #[serde(rename = "presence.left")]
    PresenceLeft(Identity),
    #[serde(rename = "message.public")]
    PublicMessage(MessageDelivery),
    #[serde(rename = "message.private")]
    PrivateMessage(MessageDelivery),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::PresenceSnapshot { .. } => "presence.snapshot",
            OutboundEvent::PresenceJoined(_) => "presence.joined",
            OutboundEvent::PresenceLeft(_) => "presence.left",
            OutboundEvent::PublicMessage(_) => "message.public",
            OutboundEvent::PrivateMessage(_) => "message.private",
        }
    }
}
