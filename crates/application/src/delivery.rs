use std::collections::HashMap;

use async_trait::async_trait;
use domain::{ConnectionId, OutboundEvent};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection {0} is not attached")]
    NotAttached(ConnectionId),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("outbound queue of connection {0} is full")]
    QueueFull(ConnectionId),
}

/// 出站投递接口
///
/// 实现必须是非阻塞的：慢连接或正在关闭的连接只会让这一次投递失败，
/// 不能拖住同一次扇出里的其他连接。
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn deliver(
        &self,
        connection_id: ConnectionId,
        event: OutboundEvent,
    ) -> Result<(), DeliveryError>;
}

/// 基于有界 mpsc 通道的连接路由器
///
/// 每个连接在建立时 attach 得到自己的接收端，由传输层的发送任务消费。
pub struct ConnectionRouter {
    senders: RwLock<HashMap<ConnectionId, mpsc::Sender<OutboundEvent>>>,
    buffer: usize,
}

impl ConnectionRouter {
    pub fn new(buffer: usize) -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// 为连接创建出站队列；重复 attach 会替换旧队列
    pub async fn attach(&self, connection_id: ConnectionId) -> mpsc::Receiver<OutboundEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut senders = self.senders.write().await;
        if senders.insert(connection_id, tx).is_some() {
            tracing::debug!(connection_id = %connection_id, "replaced outbound queue");
        }
        rx
    }

    pub async fn detach(&self, connection_id: ConnectionId) -> bool {
        self.senders.write().await.remove(&connection_id).is_some()
    }

    pub async fn attached_count(&self) -> usize {
        self.senders.read().await.len()
    }
}

#[async_trait]
impl OutboundSink for ConnectionRouter {
    async fn deliver(
        &self,
        connection_id: ConnectionId,
        event: OutboundEvent,
    ) -> Result<(), DeliveryError> {
        let senders = self.senders.read().await;
        let sender = senders
            .get(&connection_id)
            .ok_or(DeliveryError::NotAttached(connection_id))?;

        sender.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull(connection_id),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed(connection_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Identity, UserId};
    use uuid::Uuid;

    fn joined() -> OutboundEvent {
        OutboundEvent::PresenceJoined(Identity::new(UserId::from(Uuid::new_v4()), "alice"))
    }

    #[tokio::test]
    async fn delivers_to_attached_connection() {
        let router = ConnectionRouter::new(4);
        let id = ConnectionId::generate();
        let mut rx = router.attach(id).await;

        router.deliver(id, joined()).await.expect("deliver");
        assert_eq!(rx.recv().await.map(|event| event.name()), Some("presence.joined"));
    }

    #[tokio::test]
    async fn full_queue_fails_only_that_delivery() {
        let router = ConnectionRouter::new(1);
        let slow = ConnectionId::generate();
        let fast = ConnectionId::generate();
        let _slow_rx = router.attach(slow).await;
        let mut fast_rx = router.attach(fast).await;

        router.deliver(slow, joined()).await.expect("first fits");
        assert_eq!(
            router.deliver(slow, joined()).await,
            Err(DeliveryError::QueueFull(slow))
        );
        router.deliver(fast, joined()).await.expect("other connection unaffected");
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropped_receiver_reports_closed() {
        let router = ConnectionRouter::new(4);
        let id = ConnectionId::generate();
        drop(router.attach(id).await);

        assert_eq!(router.deliver(id, joined()).await, Err(DeliveryError::Closed(id)));
        assert!(router.detach(id).await);
        assert_eq!(
            router.deliver(id, joined()).await,
            Err(DeliveryError::NotAttached(id))
        );
        assert_eq!(router.attached_count().await, 0);
    }
}
