use std::sync::Arc;

use domain::{
    validate_password, DomainError, User, UserEmail, UserId, Username,
};
use uuid::Uuid;

use crate::{
    clock::Clock, error::ApplicationError, password::PasswordHasher, repository::UserRepository,
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<String>,
}

/// 登录请求，`login` 可以是用户名也可以是邮箱
#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// 资料修改，未提供的字段保持不变
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let username = Username::parse(request.username)?;
        let email = UserEmail::parse(request.email)?;
        validate_password(&request.password)?;

        let repo = &self.deps.user_repository;
        if repo.find_by_username(&username).await?.is_some()
            || repo.find_by_email(&email).await?.is_some()
        {
            return Err(ApplicationError::Domain(DomainError::UserAlreadyExists));
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;

        let user = User::register(
            UserId::from(Uuid::new_v4()),
            username,
            email,
            password_hash,
            request.avatar,
            self.deps.clock.now(),
        );

        // 并发注册同名用户时由仓储的唯一约束兜底，Conflict 会映射为 UserAlreadyExists
        let stored = repo.create(user).await?;
        tracing::info!(user_id = %stored.id, username = %stored.username.as_str(), "用户注册成功");
        Ok(stored)
    }

    pub async fn authenticate(
        &self,
        request: AuthenticateUserRequest,
    ) -> Result<User, ApplicationError> {
        let mut user = self
            .find_by_login(&request.login)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            tracing::debug!(user_id = %user.id, "password mismatch");
            return Err(ApplicationError::Authentication);
        }

        if !user.is_active {
            return Err(ApplicationError::Domain(DomainError::UserInactive));
        }

        user.record_login(self.deps.clock.now());
        let user = self.deps.user_repository.update(user).await?;
        tracing::info!(user_id = %user.id, "用户登录");
        Ok(user)
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, ApplicationError> {
        let repo = &self.deps.user_repository;
        if login.contains('@') {
            let Ok(email) = UserEmail::parse(login) else {
                return Ok(None);
            };
            return Ok(repo.find_by_email(&email).await?);
        }

        let Ok(username) = Username::parse(login) else {
            return Ok(None);
        };
        Ok(repo.find_by_username(&username).await?)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::UserNotFound))
    }

    /// 令牌仍然有效但账号已停用时同样拒绝
    pub async fn get_active_user(&self, id: UserId) -> Result<User, ApplicationError> {
        let user = self.get_user(id).await?;
        if !user.is_active {
            return Err(ApplicationError::Domain(DomainError::UserInactive));
        }
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApplicationError> {
        Ok(self.deps.user_repository.list().await?)
    }

    pub async fn change_password(
        &self,
        id: UserId,
        request: ChangePasswordRequest,
    ) -> Result<(), ApplicationError> {
        let mut user = self.get_active_user(id).await?;

        let current_ok = self
            .deps
            .password_hasher
            .verify(&request.current_password, &user.password)
            .await?;
        if !current_ok {
            return Err(ApplicationError::Authentication);
        }

        validate_password(&request.new_password)?;
        let hashed = self.deps.password_hasher.hash(&request.new_password).await?;
        user.change_password(hashed, self.deps.clock.now());
        self.deps.user_repository.update(user).await?;

        tracing::info!(user_id = %id, "密码已修改");
        Ok(())
    }

    pub async fn update_profile(
        &self,
        id: UserId,
        request: UpdateProfileRequest,
    ) -> Result<User, ApplicationError> {
        let mut user = self.get_user(id).await?;
        let username = request.username.map(Username::parse).transpose()?;
        let email = request.email.map(UserEmail::parse).transpose()?;

        let repo = &self.deps.user_repository;
        if let Some(username) = username.as_ref().filter(|name| **name != user.username) {
            if repo.find_by_username(username).await?.is_some() {
                return Err(ApplicationError::Domain(DomainError::UserAlreadyExists));
            }
        }
        if let Some(email) = email.as_ref().filter(|email| **email != user.email) {
            if repo.find_by_email(email).await?.is_some() {
                return Err(ApplicationError::Domain(DomainError::UserAlreadyExists));
            }
        }

        user.update_profile(username, email, request.avatar, self.deps.clock.now());
        let user = repo.update(user).await?;
        tracing::info!(user_id = %user.id, username = %user.username.as_str(), "用户资料已更新");
        Ok(user)
    }

    pub async fn delete_user(&self, id: UserId) -> Result<(), ApplicationError> {
        if !self.deps.user_repository.delete(id).await? {
            return Err(ApplicationError::Domain(DomainError::UserNotFound));
        }
        tracing::info!(user_id = %id, "用户已删除");
        Ok(())
    }
}
