//! 主应用程序入口
//!
//! 加载配置、初始化存储，启动 HTTP 与 WebSocket 服务。

use std::time::Duration;

use anyhow::Context;
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

/// 关停时等待持久化队列排空的上限
const PERSISTENCE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let infra = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        bcrypt_cost: config.security.bcrypt_cost,
    })
    .await
    .context("初始化存储失败")?;

    let (state, persistence_worker) = AppState::build(&config, &infra);
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;

    tracing::info!("聊天中继服务启动在 http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("服务已停止，等待消息持久化完成");
    match tokio::time::timeout(PERSISTENCE_DRAIN_TIMEOUT, persistence_worker).await {
        Ok(Ok(report)) => tracing::info!(
            stored = report.stored,
            failed = report.failed,
            "持久化队列已排空"
        ),
        Ok(Err(err)) => tracing::error!(error = %err, "持久化任务异常退出"),
        Err(_) => tracing::warn!("等待持久化超时，未写入的消息将丢失"),
    }

    infra.close().await;
    Ok(())
}

/// 收到 Ctrl-C 后取消令牌，已升级的 WebSocket 连接随之断开并释放中继
async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听 Ctrl-C 信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到关停信号");
    shutdown.cancel();
}
