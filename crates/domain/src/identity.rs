//! 连接身份
//!
//! 由身份与会话服务在 join 之前提供，绑定到连接后不可变。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ConnectionId, Timestamp, UserId};

/// 绑定到连接上的用户身份
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// 在线条目：连接句柄与身份的绑定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub connection_id: ConnectionId,
    pub identity: Identity,
    pub online_since: Timestamp,
}
