use std::sync::Arc;

use application::{
    Clock, ConnectionRouter, MessageService, MessageServiceDependencies, PersistenceQueue,
    PersistenceReport, PresenceRegistry, RelayEngine, RelayEngineDependencies, SystemClock,
    UserService, UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub message_service: Arc<MessageService>,
    pub relay: Arc<RelayEngine>,
    pub connections: Arc<ConnectionRouter>,
    pub jwt_service: Arc<JwtService>,
    pub cors_origins: Arc<[String]>,
    /// 取消后所有 WebSocket 连接退出，释放中继与持久化队列
    pub shutdown: CancellationToken,
}

impl AppState {
    /// 组装服务与中继；返回的句柄在所有状态副本释放后结束，
    /// 关停时先取消 `shutdown`，再等待该句柄即可排空持久化队列。
    pub fn build(
        config: &AppConfig,
        infra: &Infrastructure,
    ) -> (Self, JoinHandle<PersistenceReport>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let user_service = UserService::new(UserServiceDependencies {
            user_repository: infra.user_repository.clone(),
            password_hasher: infra.password_hasher_trait(),
            clock: clock.clone(),
        });
        let message_service = MessageService::new(MessageServiceDependencies {
            message_repository: infra.message_repository.clone(),
            user_repository: infra.user_repository.clone(),
            clock: clock.clone(),
        });

        let connections = Arc::new(ConnectionRouter::new(config.relay.outbound_buffer));
        let (persistence, worker) = PersistenceQueue::spawn(
            infra.message_repository.clone(),
            config.relay.persistence_queue,
        );
        let relay = RelayEngine::new(RelayEngineDependencies {
            registry: Arc::new(PresenceRegistry::new(clock.clone())),
            outbound: connections.clone(),
            persistence,
            clock,
        });

        let state = Self {
            user_service: Arc::new(user_service),
            message_service: Arc::new(message_service),
            relay: Arc::new(relay),
            connections,
            jwt_service: Arc::new(JwtService::new(config.jwt.clone())),
            cors_origins: config.server.cors_origins.clone().into(),
            shutdown: CancellationToken::new(),
        };
        (state, worker)
    }
}
