//! WebSocket 文本帧协议
//!
//! 客户端只发送三种帧；身份来自升级时校验过的访问令牌，不由客户端提供。

use domain::{Identity, InboundEvent, UserId};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    Join,
    SendPublic {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    SendPrivate {
        recipient_user_id: UserId,
        text: String,
    },
}

impl ClientFrame {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn into_inbound(self, identity: &Identity) -> InboundEvent {
        match self {
            ClientFrame::Join => InboundEvent::Join(identity.clone()),
            ClientFrame::SendPublic { text } => InboundEvent::SendPublic { text },
            ClientFrame::SendPrivate {
                recipient_user_id,
                text,
            } => InboundEvent::SendPrivate {
                recipient_id: recipient_user_id,
                text,
            },
        }
    }
}
