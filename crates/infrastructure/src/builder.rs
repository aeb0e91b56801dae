use std::sync::Arc;

use application::{MessageRepository, PasswordHasher, UserRepository};
use thiserror::Error;

use crate::{
    memory::{InMemoryMessageRepository, InMemoryUserRepository},
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Clone, Default)]
pub struct InfrastructureConfig {
    /// 为空时使用内存仓储
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bcrypt_cost: Option<u32>,
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<BcryptPasswordHasher>,
    pub pg: Option<PgStorage>,
}

impl Infrastructure {
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let password_hasher = Arc::new(BcryptPasswordHasher::new(config.bcrypt_cost));

        let Some(database_url) = config.database_url.as_deref() else {
            tracing::warn!("未配置数据库，使用内存存储，重启后数据丢失");
            return Ok(Self::in_memory_with(password_hasher));
        };

        let pool = create_pg_pool(database_url, config.max_connections.max(1)).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "PostgreSQL 连接池就绪");

        let storage = PgStorage::new(pool);
        Ok(Self {
            user_repository: storage.user_repository.clone(),
            message_repository: storage.message_repository.clone(),
            password_hasher,
            pg: Some(storage),
        })
    }

    pub fn in_memory(bcrypt_cost: Option<u32>) -> Self {
        Self::in_memory_with(Arc::new(BcryptPasswordHasher::new(bcrypt_cost)))
    }

    fn in_memory_with(password_hasher: Arc<BcryptPasswordHasher>) -> Self {
        Self {
            user_repository: Arc::new(InMemoryUserRepository::new()),
            message_repository: Arc::new(InMemoryMessageRepository::new()),
            password_hasher,
            pg: None,
        }
    }

    pub fn password_hasher_trait(&self) -> Arc<dyn PasswordHasher> {
        self.password_hasher.clone()
    }

    /// 关闭数据库连接池
    pub async fn close(&self) {
        if let Some(storage) = &self.pg {
            storage.pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_database_url_selects_memory_storage() {
        let infra = Infrastructure::connect(InfrastructureConfig {
            database_url: None,
            max_connections: 5,
            bcrypt_cost: Some(4),
        })
        .await
        .unwrap();

        assert!(infra.pg.is_none());
        assert_eq!(infra.password_hasher.cost(), 4);
        assert!(infra.user_repository.list().await.unwrap().is_empty());
    }
}
