//! 主应用程序入口
//!
//! 加载配置、连接数据库并启动 Axum Web API 与实时通道服务。

use std::sync::Arc;

use application::{
    ChannelAuthenticator, Clock, ConnectionHub, ConversationService,
    ConversationServiceDependencies, MessageRelay, PresenceRegistry, SystemClock,
};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, ApiSettings, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let infrastructure = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
    })
    .await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let relay = Arc::new(MessageRelay::new(
        Arc::new(PresenceRegistry::new()),
        Arc::new(ConnectionHub::new()),
        clock.clone(),
    ));

    let conversation_service = ConversationService::new(ConversationServiceDependencies {
        message_store: infrastructure.message_store(),
        user_directory: infrastructure.user_directory(),
        relay: relay.clone(),
        clock,
    });

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let authenticator = Arc::new(ChannelAuthenticator::new(
        jwt_service.clone(),
        config.channel.require_token,
    ));

    let state = AppState::new(
        Arc::new(conversation_service),
        relay,
        authenticator,
        jwt_service,
        infrastructure.user_directory(),
        ApiSettings::from(&config),
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "私信中继服务已启动");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，开始关闭");
}
