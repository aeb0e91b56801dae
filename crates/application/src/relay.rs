//! 中继引擎
//!
//! 把每个连接的入站事件翻译成注册表变更和出站投递。每个连接持有自己的
//! `RelayConnection`，由传输层的单个任务按到达顺序调用 `dispatch`，
//! 因此同一连接内的事件天然有序，不同连接之间并行处理。

use std::sync::Arc;

use domain::{
    ChatMessage, ConnectionId, DomainError, Identity, InboundEvent, MessageText, OutboundEvent,
    UserId,
};
use thiserror::Error;

use crate::clock::Clock;
use crate::delivery::OutboundSink;
use crate::persistence::PersistenceQueue;
use crate::presence::PresenceRegistry;

/// 单个连接的状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unjoined,
    Joined,
    Closed,
}

/// 中继错误，全部是非致命的：事件被丢弃，连接保持当前状态
#[derive(Debug, Error, PartialEq)]
pub enum RelayError {
    #[error("{event} is not valid while the connection is {state:?}")]
    ProtocolViolation {
        event: &'static str,
        state: ConnectionState,
    },
    #[error("connection {0} has no presence entry")]
    UnknownSender(ConnectionId),
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] DomainError),
}

/// 传输层持有的单连接上下文
#[derive(Debug)]
pub struct RelayConnection {
    id: ConnectionId,
    state: ConnectionState,
}

impl RelayConnection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: ConnectionState::Unjoined,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

pub struct RelayEngineDependencies {
    pub registry: Arc<PresenceRegistry>,
    pub outbound: Arc<dyn OutboundSink>,
    pub persistence: PersistenceQueue,
    pub clock: Arc<dyn Clock>,
}

pub struct RelayEngine {
    deps: RelayEngineDependencies,
}

impl RelayEngine {
    pub fn new(deps: RelayEngineDependencies) -> Self {
        Self { deps }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.deps.registry
    }

    /// 状态机入口
    pub async fn dispatch(
        &self,
        connection: &mut RelayConnection,
        event: InboundEvent,
    ) -> Result<(), RelayError> {
        use ConnectionState::*;

        match (connection.state, event) {
            (Unjoined, InboundEvent::Join(identity)) => {
                self.join(connection.id, identity).await;
                connection.state = Joined;
                Ok(())
            }
            (Joined, InboundEvent::SendPublic { text }) => {
                self.send_public(connection.id, text).await
            }
            (Joined, InboundEvent::SendPrivate { recipient_id, text }) => {
                self.send_private(connection.id, recipient_id, text).await
            }
            (Closed, InboundEvent::Disconnect) => Ok(()),
            (_, InboundEvent::Disconnect) => {
                self.disconnect(connection.id).await;
                connection.state = Closed;
                Ok(())
            }
            (state, event) => {
                tracing::debug!(
                    connection_id = %connection.id,
                    event = event.name(),
                    ?state,
                    "discarding event not valid in current state"
                );
                Err(RelayError::ProtocolViolation {
                    event: event.name(),
                    state,
                })
            }
        }
    }

    async fn join(&self, connection_id: ConnectionId, identity: Identity) {
        self.deps
            .registry
            .register(connection_id, identity.clone())
            .await;

        let others: Vec<ConnectionId> = self
            .deps
            .registry
            .connections()
            .await
            .into_iter()
            .filter(|id| *id != connection_id)
            .collect();
        self.fan_out(&others, &OutboundEvent::PresenceJoined(identity.clone()))
            .await;

        let users = self.deps.registry.snapshot().await;
        self.fan_out(&[connection_id], &OutboundEvent::PresenceSnapshot { users })
            .await;

        tracing::info!(
            connection_id = %connection_id,
            user_id = %identity.user_id,
            display_name = %identity.display_name,
            "用户加入聊天"
        );
    }

    async fn send_public(&self, connection_id: ConnectionId, text: String) -> Result<(), RelayError> {
        let sender = self.sender_of(connection_id).await?;
        let text = MessageText::parse(text)?;
        let message = ChatMessage::public(
            sender.user_id,
            sender.display_name,
            text.into_inner(),
            self.deps.clock.now(),
        );

        let targets = self.deps.registry.connections().await;
        let delivered = self.fan_out(&targets, &message.to_outbound()).await;
        tracing::debug!(
            connection_id = %connection_id,
            sender_id = %message.sender_id,
            delivered,
            "public message relayed"
        );

        self.deps.persistence.submit(message);
        Ok(())
    }

    async fn send_private(
        &self,
        connection_id: ConnectionId,
        recipient_id: UserId,
        text: String,
    ) -> Result<(), RelayError> {
        let sender = self.sender_of(connection_id).await?;
        let text = MessageText::parse(text)?;
        let message = ChatMessage::private(
            sender.user_id,
            sender.display_name,
            recipient_id,
            text.into_inner(),
            self.deps.clock.now(),
        );

        // 接收方不在线时只做持久化，实时投递静默丢弃
        let targets = self.deps.registry.find_connections(recipient_id).await;
        let delivered = self.fan_out(&targets, &message.to_outbound()).await;
        tracing::debug!(
            connection_id = %connection_id,
            sender_id = %message.sender_id,
            recipient_id = %recipient_id,
            delivered,
            "private message relayed"
        );

        self.deps.persistence.submit(message);
        Ok(())
    }

    async fn disconnect(&self, connection_id: ConnectionId) {
        let Some(identity) = self.deps.registry.unregister(connection_id).await else {
            tracing::debug!(connection_id = %connection_id, "disconnect without presence entry");
            return;
        };

        let remaining = self.deps.registry.connections().await;
        self.fan_out(&remaining, &OutboundEvent::PresenceLeft(identity.clone()))
            .await;

        tracing::info!(
            connection_id = %connection_id,
            user_id = %identity.user_id,
            display_name = %identity.display_name,
            "用户离开聊天"
        );
    }

    async fn sender_of(&self, connection_id: ConnectionId) -> Result<Identity, RelayError> {
        self.deps
            .registry
            .lookup(connection_id)
            .await
            .ok_or(RelayError::UnknownSender(connection_id))
    }

    /// 逐个连接投递，单个连接失败只记录日志，返回成功投递的数量
    async fn fan_out(&self, targets: &[ConnectionId], event: &OutboundEvent) -> usize {
        let mut delivered = 0;
        for target in targets {
            match self.deps.outbound.deliver(*target, event.clone()).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::debug!(
                        connection_id = %target,
                        event = event.name(),
                        error = %err,
                        "delivery dropped"
                    );
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::delivery::ConnectionRouter;
    use crate::persistence::PersistenceReport;
    use crate::repository::MockMessageRepository;
    use domain::RepositoryError;
    use uuid::Uuid;

    #[tokio::test]
    async fn store_failure_does_not_affect_live_delivery() {
        let mut store = MockMessageRepository::new();
        store
            .expect_append()
            .times(1)
            .returning(|_| Err(RepositoryError::storage("disk full")));

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(PresenceRegistry::new(clock.clone()));
        let router = Arc::new(ConnectionRouter::new(16));
        let (persistence, worker) = PersistenceQueue::spawn(Arc::new(store), 8);
        let engine = RelayEngine::new(RelayEngineDependencies {
            registry,
            outbound: router.clone(),
            persistence,
            clock,
        });

        let mut conn = RelayConnection::new(ConnectionId::generate());
        let mut rx = router.attach(conn.id()).await;
        let alice = Identity::new(UserId::from(Uuid::new_v4()), "alice");
        engine
            .dispatch(&mut conn, InboundEvent::Join(alice))
            .await
            .expect("join");
        engine
            .dispatch(
                &mut conn,
                InboundEvent::SendPublic {
                    text: "hello".into(),
                },
            )
            .await
            .expect("send");

        assert_eq!(rx.recv().await.map(|e| e.name()), Some("presence.snapshot"));
        assert_eq!(rx.recv().await.map(|e| e.name()), Some("message.public"));

        drop(engine);
        let report = worker.await.expect("worker");
        assert_eq!(report.failed, 1);
        assert_eq!(report.stored, 0);
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_side_effects() {
        let mut store = MockMessageRepository::new();
        store.expect_append().times(0);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(PresenceRegistry::new(clock.clone()));
        let router = Arc::new(ConnectionRouter::new(16));
        let (persistence, worker) = PersistenceQueue::spawn(Arc::new(store), 8);
        let engine = RelayEngine::new(RelayEngineDependencies {
            registry,
            outbound: router.clone(),
            persistence,
            clock,
        });

        let mut conn = RelayConnection::new(ConnectionId::generate());
        let _rx = router.attach(conn.id()).await;
        engine
            .dispatch(
                &mut conn,
                InboundEvent::Join(Identity::new(UserId::from(Uuid::new_v4()), "alice")),
            )
            .await
            .expect("join");

        let result = engine
            .dispatch(&mut conn, InboundEvent::SendPublic { text: "   ".into() })
            .await;
        assert!(matches!(result, Err(RelayError::InvalidMessage(_))));
        assert_eq!(conn.state(), ConnectionState::Joined);

        drop(engine);
        assert_eq!(worker.await.expect("worker"), PersistenceReport::default());
    }
}
