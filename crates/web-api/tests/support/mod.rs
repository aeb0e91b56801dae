#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use application::PersistenceReport;
use config::AppConfig;
use futures_util::{SinkExt, StreamExt};
use infrastructure::Infrastructure;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
    state: AppState,
    worker: Option<JoinHandle<PersistenceReport>>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub struct Session {
    pub user_id: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// 使用内存存储在随机端口上启动完整服务
pub async fn spawn_app() -> TestApp {
    let mut config = AppConfig::default();
    config.jwt.secret = "integration-test-secret-with-enough-length".into();
    config.relay.outbound_buffer = 64;

    let infra = Infrastructure::in_memory(Some(4));
    let (state, worker) = AppState::build(&config, &infra);
    let app = router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestApp {
        addr,
        client: Client::new(),
        shutdown: Some(shutdown_tx),
        state,
        worker: Some(worker),
    }
}

impl TestApp {
    /// 与二进制相同的关停顺序：断开连接、停止服务、等待持久化队列排空
    pub async fn shutdown(mut self) -> PersistenceReport {
        let worker = self.worker.take().expect("worker handle");
        self.state.shutdown.cancel();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        drop(self);
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("persistence worker drained")
            .expect("persistence worker")
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn register(&self, username: &str) -> Session {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": "secret123"
            }))
            .send()
            .await
            .expect("register request");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let body: Value = response.json().await.expect("register json");
        session_from(&body)
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request")
    }

    pub async fn connect_ws(&self, token: &str) -> WsClient {
        let url = format!("ws://{}/ws?token={}", self.addr, token);
        let (stream, _) = connect_async(url).await.expect("websocket connect");
        stream
    }
}

pub fn session_from(body: &Value) -> Session {
    Session {
        user_id: body["user"]["id"].as_str().expect("user id").to_owned(),
        username: body["user"]["username"].as_str().expect("username").to_owned(),
        access_token: body["accessToken"].as_str().expect("access token").to_owned(),
        refresh_token: body["refreshToken"].as_str().expect("refresh token").to_owned(),
    }
}

pub async fn send_frame(ws: &mut WsClient, frame: Value) {
    ws.send(TungsteniteMessage::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一条出站事件，跳过控制帧
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("event json");
        }
    }
}

/// 断言一小段时间内没有任何事件到达
pub async fn assert_silent(ws: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "unexpected event: {:?}", result);
}

/// 连接并加入，返回时已收到自己的在线快照
pub async fn join(app: &TestApp, session: &Session) -> (WsClient, Value) {
    let mut ws = app.connect_ws(&session.access_token).await;
    send_frame(&mut ws, json!({ "type": "join" })).await;
    let snapshot = next_event(&mut ws).await;
    assert_eq!(snapshot["type"], "presence.snapshot");
    (ws, snapshot)
}
