use std::sync::Arc;
use std::time::Duration;

use application::{ChannelAuthenticator, ConversationService, MessageRelay, UserDirectory};
use config::AppConfig;

use crate::JwtService;

/// HTTP 与持久连接的运行参数
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub cors_origins: Vec<String>,
    pub max_frame_bytes: usize,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

impl From<&AppConfig> for ApiSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            cors_origins: config.server.cors_origins.clone(),
            max_frame_bytes: config.channel.max_frame_bytes,
            ping_interval: Duration::from_secs(config.channel.ping_interval_seconds),
            idle_timeout: Duration::from_secs(config.channel.idle_timeout_seconds),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub conversation_service: Arc<ConversationService>,
    pub relay: Arc<MessageRelay>,
    pub authenticator: Arc<ChannelAuthenticator>,
    pub jwt_service: Arc<JwtService>,
    /// REST 认证时确认令牌对应的用户仍然存在
    pub user_directory: Arc<dyn UserDirectory>,
    pub settings: Arc<ApiSettings>,
}

impl AppState {
    pub fn new(
        conversation_service: Arc<ConversationService>,
        relay: Arc<MessageRelay>,
        authenticator: Arc<ChannelAuthenticator>,
        jwt_service: Arc<JwtService>,
        user_directory: Arc<dyn UserDirectory>,
        settings: ApiSettings,
    ) -> Self {
        Self {
            conversation_service,
            relay,
            authenticator,
            jwt_service,
            user_directory,
            settings: Arc::new(settings),
        }
    }
}
