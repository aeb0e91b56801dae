use std::sync::Arc;

use domain::ChatMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::repository::MessageRepository;

/// 持久化工作任务退出时的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceReport {
    pub stored: u64,
    pub failed: u64,
}

/// 消息持久化队列
///
/// 中继把消息放进有界队列后立即返回，由后台任务逐条写入消息存储。
/// 存储失败只记录日志，不重试；队列满时丢弃该条持久化请求。
#[derive(Clone)]
pub struct PersistenceQueue {
    sender: mpsc::Sender<ChatMessage>,
}

impl PersistenceQueue {
    /// 启动后台写入任务。所有队列句柄被丢弃后任务结束并返回统计。
    pub fn spawn(
        store: Arc<dyn MessageRepository>,
        capacity: usize,
    ) -> (Self, JoinHandle<PersistenceReport>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(store, receiver));
        (Self { sender }, worker)
    }

    /// 提交一条消息，不等待写入结果
    pub fn submit(&self, message: ChatMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(
                    sender_id = %message.sender_id,
                    is_private = message.is_private,
                    "persistence queue full, message not stored"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("persistence worker stopped, message not stored");
                false
            }
        }
    }
}

async fn run_worker(
    store: Arc<dyn MessageRepository>,
    mut receiver: mpsc::Receiver<ChatMessage>,
) -> PersistenceReport {
    let mut report = PersistenceReport::default();

    while let Some(message) = receiver.recv().await {
        let sender_id = message.sender_id;
        match store.append(message).await {
            Ok(stored) => {
                report.stored += 1;
                tracing::debug!(message_id = %stored.id, sender_id = %sender_id, "消息已持久化");
            }
            Err(err) => {
                report.failed += 1;
                tracing::warn!(error = %err, sender_id = %sender_id, "消息持久化失败");
            }
        }
    }

    tracing::info!(stored = report.stored, failed = report.failed, "持久化任务结束");
    report
}
