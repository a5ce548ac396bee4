//! 主应用程序入口
//!
//! 加载配置，组装存储、服务与连接中枢，启动 Axum 服务并处理优雅关闭。

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use application::{
    Clock, Hub, HubDependencies, HubHandle, InMemoryMessageRepository, InMemoryStatusRepository,
    MessageService, MessageServiceDependencies, StatusService, StatusServiceDependencies,
    SystemClock,
};
use config::AppConfig;
use domain::{MessageRepository, StatusRepository};
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    // RUST_LOG 优先，其次使用配置中的日志级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(config = %config.sanitize(), "配置已加载");

    let (message_repository, status_repository) = build_storage(&config).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        message_repository,
        clock: clock.clone(),
    }));
    let status_service = Arc::new(StatusService::new(StatusServiceDependencies {
        status_repository,
        clock: clock.clone(),
    }));

    let (hub, hub_handle) = Hub::new(
        HubDependencies {
            message_service: message_service.clone(),
            status_service: status_service.clone(),
            clock,
        },
        &config.hub,
    );
    let hub_task = tokio::spawn(hub.run());

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let state = AppState::new(
        message_service,
        status_service,
        hub_handle.clone(),
        jwt_service,
        config.websocket.clone(),
        config.hub.outbound_capacity,
    );

    let app = router(state);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!("私信中继服务启动在 http://{}", address);

    let shutdown_timeout = config.hub.shutdown_timeout();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub_handle, shutdown_timeout))
        .await
        .context("server error")?;

    match tokio::time::timeout(shutdown_timeout, hub_task).await {
        Ok(Ok(())) => tracing::info!("hub task finished"),
        Ok(Err(err)) => tracing::error!(error = %err, "hub task failed"),
        Err(_) => tracing::warn!("hub task did not finish before shutdown timeout"),
    }

    Ok(())
}

/// 有数据库地址时连接 PostgreSQL 并执行迁移，否则使用内存存储
async fn build_storage(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn MessageRepository>, Arc<dyn StatusRepository>)> {
    if config.database.url.is_none() {
        tracing::warn!("未配置数据库，使用内存存储（重启后数据丢失）");
        return Ok((
            Arc::new(InMemoryMessageRepository::new()),
            Arc::new(InMemoryStatusRepository::new()),
        ));
    }

    let infrastructure = Infrastructure::connect(&config.database)
        .await
        .context("failed to initialise database")?;
    Ok((
        infrastructure.message_repository_trait(),
        infrastructure.status_repository_trait(),
    ))
}

/// 等待 Ctrl-C 或 SIGTERM，随后在期限内通知 Hub 关闭
async fn shutdown_signal(hub: HubHandle, limit: Duration) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    match tokio::time::timeout(limit, hub.shutdown()).await {
        Ok(Ok(())) => tracing::info!("hub notified all connections"),
        Ok(Err(err)) => tracing::warn!(error = %err, "hub already stopped"),
        Err(_) => tracing::warn!("hub shutdown exceeded timeout"),
    }
}
