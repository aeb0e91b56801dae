//! 用户实体

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, Username};

/// 用户实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: UserEmail,
    /// 密码哈希（敏感信息，不在序列化中包含）
    #[serde(skip_serializing)]
    pub password: PasswordHash,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// 注册新用户，默认处于激活状态
    pub fn register(
        id: UserId,
        username: Username,
        email: UserEmail,
        password: PasswordHash,
        avatar: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            username,
            email,
            password,
            avatar: avatar.filter(|value| !value.trim().is_empty()),
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_login(&mut self, now: Timestamp) {
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn change_password(&mut self, password: PasswordHash, now: Timestamp) {
        self.password = password;
        self.updated_at = now;
    }

    /// 修改资料，`None` 表示保持不变；头像传空字符串即清除
    pub fn update_profile(
        &mut self,
        username: Option<Username>,
        email: Option<UserEmail>,
        avatar: Option<String>,
        now: Timestamp,
    ) {
        if let Some(username) = username {
            self.username = username;
        }
        if let Some(email) = email {
            self.email = email;
        }
        if let Some(avatar) = avatar {
            self.avatar = Some(avatar).filter(|value| !value.trim().is_empty());
        }
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: Timestamp) {
        self.is_active = false;
        self.updated_at = now;
    }

    /// 用户在中继中的身份，显示名即用户名
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.username.as_str())
    }
}
