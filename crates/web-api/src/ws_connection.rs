use application::RelayConnection;
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, Identity, InboundEvent, OutboundEvent};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::protocol::ClientFrame;
use crate::state::AppState;

/// 断开后等待发送任务写完剩余事件和关闭帧的上限
const SEND_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket 连接
///
/// 一个连接一个接收循环，按到达顺序把入站帧交给中继；
/// 出站事件经连接路由器的有界队列，由独立的发送任务写回客户端。
pub struct WebSocketConnection {
    state: AppState,
    identity: Identity,
    relay: RelayConnection,
}

impl WebSocketConnection {
    pub fn new(state: AppState, identity: Identity) -> Self {
        Self {
            state,
            identity,
            relay: RelayConnection::new(ConnectionId::generate()),
        }
    }

    /// 运行连接主循环，返回时连接已从注册表和路由器中移除
    pub async fn run(mut self, socket: WebSocket) {
        let connection_id = self.relay.id();
        let mut outbound = self.state.connections.attach(connection_id).await;
        tracing::info!(
            connection_id = %connection_id,
            user_id = %self.identity.user_id,
            "WebSocket 连接已建立"
        );

        let (mut sender, mut incoming) = socket.split();

        // pong 与出站事件共用一个写端
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(8);

        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data),
                    },
                    event = outbound.recv() => {
                        let Some(event) = event else { break };
                        match serialize(&event) {
                            Some(text) => WsMessage::Text(text.into()),
                            None => continue,
                        }
                    }
                };
                if sender.send(frame).await.is_err() {
                    tracing::debug!(connection_id = %connection_id, "websocket write failed");
                    break;
                }
            }
            let _ = sender.close().await;
        });

        let shutdown = self.state.shutdown.clone();
        let recv_loop = async {
            while let Some(message) = incoming.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::debug!(connection_id = %connection_id, error = %err, "websocket read failed");
                        break;
                    }
                };
                match message {
                    WsMessage::Text(text) => self.handle_text(text.as_str()).await,
                    WsMessage::Ping(data) => {
                        if cmd_tx.send(WsCommand::SendPong(data)).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Pong(_) => {}
                    WsMessage::Binary(_) => {
                        tracing::debug!(connection_id = %connection_id, "ignoring binary frame");
                    }
                    WsMessage::Close(_) => {
                        tracing::info!(connection_id = %connection_id, "WebSocket收到关闭消息");
                        break;
                    }
                }
            }
        };

        let send_finished = tokio::select! {
            _ = &mut send_task => true,
            _ = recv_loop => false,
            _ = shutdown.cancelled() => {
                tracing::info!(connection_id = %connection_id, "服务关停，关闭WebSocket连接");
                false
            }
        };

        if let Err(err) = self
            .state
            .relay
            .dispatch(&mut self.relay, InboundEvent::Disconnect)
            .await
        {
            tracing::warn!(connection_id = %connection_id, error = %err, "disconnect rejected");
        }
        // 摘除后出站队列在排空剩余事件时结束，发送任务随后写出关闭帧
        self.state.connections.detach(connection_id).await;
        drop(cmd_tx);
        if !send_finished
            && tokio::time::timeout(SEND_DRAIN_TIMEOUT, &mut send_task)
                .await
                .is_err()
        {
            tracing::debug!(connection_id = %connection_id, "send task did not drain in time");
            send_task.abort();
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = %self.identity.user_id,
            "WebSocket连接已断开，在线状态已清理"
        );
    }

    async fn handle_text(&mut self, raw: &str) {
        let connection_id = self.relay.id();
        let frame = match ClientFrame::parse(raw) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "malformed client frame");
                return;
            }
        };

        let event = frame.into_inbound(&self.identity);
        if let Err(err) = self.state.relay.dispatch(&mut self.relay, event).await {
            tracing::warn!(connection_id = %connection_id, error = %err, "event discarded");
        }
    }
}

fn serialize(event: &OutboundEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(err) => {
            tracing::warn!(error = %err, event = event.name(), "failed to serialize websocket payload");
            None
        }
    }
}

/// 发送任务的写命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Bytes),
}
