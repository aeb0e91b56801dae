use async_trait::async_trait;
use domain::{
    ChatMessage, MessageId, RepositoryError, StoredMessage, User, UserEmail, UserId, Username,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 用户名或邮箱重复时返回 `RepositoryError::Conflict`
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn update(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(&self, username: &Username)
        -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;
    async fn list(&self) -> Result<Vec<User>, RepositoryError>;
    /// 删除成功返回 true，用户不存在返回 false
    async fn delete(&self, id: UserId) -> Result<bool, RepositoryError>;
}

/// 消息存储：只追加的聊天记录
///
/// 中继只调用 `append`，而且不等待结果；其余方法服务于历史查询接口。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: ChatMessage) -> Result<StoredMessage, RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<StoredMessage>, RepositoryError>;

    // 公共消息，按时间升序返回最近的 limit 条
    async fn list_public(&self, limit: u32) -> Result<Vec<StoredMessage>, RepositoryError>;

    // 两个用户之间双向的私聊记录，按时间升序返回最近的 limit 条
    async fn list_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;

    /// 删除成功返回 true，记录不存在返回 false
    async fn delete(&self, id: MessageId) -> Result<bool, RepositoryError>;
}
