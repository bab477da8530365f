use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    memory::{InMemoryMessageStore, InMemoryUserDirectory},
    ChannelAuthenticator, Clock, ConnectionHub, ConversationService,
    ConversationServiceDependencies, MessageRelay, PresenceRegistry, SystemClock,
};
use domain::{UserId, UserProfile};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::{
    net::TcpListener,
    sync::oneshot,
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, ApiSettings, AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub const TEST_SECRET: &str = "integration-test-secret-with-32-chars";

/// 基于内存存储的测试服务
pub struct TestServer {
    pub addr: SocketAddr,
    pub jwt: Arc<JwtService>,
    pub store: Arc<InMemoryMessageStore>,
    pub relay: Arc<MessageRelay>,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(Duration::from_secs(25), Duration::from_secs(60)).await
    }

    pub async fn start_with(ping_interval: Duration, idle_timeout: Duration) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryMessageStore::new(clock.clone()));
        let directory = Arc::new(InMemoryUserDirectory::new());
        directory.insert(UserProfile::new(user("alice"), "Alice", "alice.png"));
        directory.insert(UserProfile::new(user("bob"), "Bob", "bob.png"));

        let relay = Arc::new(MessageRelay::new(
            Arc::new(PresenceRegistry::new()),
            Arc::new(ConnectionHub::new()),
            clock.clone(),
        ));
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: TEST_SECRET.to_string(),
            expiration_hours: 1,
        }));
        let conversation_service = ConversationService::new(ConversationServiceDependencies {
            message_store: store.clone(),
            user_directory: directory.clone(),
            relay: relay.clone(),
            clock,
        });
        let authenticator = Arc::new(ChannelAuthenticator::new(jwt.clone(), false));

        let state = AppState::new(
            Arc::new(conversation_service),
            relay.clone(),
            authenticator,
            jwt.clone(),
            directory,
            ApiSettings {
                cors_origins: vec!["http://localhost:5173".to_string()],
                max_frame_bytes: 64 * 1024,
                ping_interval,
                idle_timeout,
            },
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            jwt,
            store,
            relay,
            _shutdown: shutdown_tx,
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn token(&self, name: &str) -> String {
        self.jwt.generate_token(&user(name)).expect("token")
    }

    /// 建立连接，并等待服务端会话登记到连接中心
    pub async fn connect(&self) -> WsClient {
        let attached = self.relay.hub().len();
        let (ws, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("ws connect");

        for _ in 0..200 {
            if self.relay.hub().len() > attached {
                return ws;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("server never attached the connection");
    }
}

pub fn user(name: &str) -> UserId {
    UserId::parse(name).expect("user id")
}

/// 读取下一个文本事件，超时视为失败
pub async fn next_event(ws: &mut WsClient) -> Value {
    try_next_event(ws, Duration::from_secs(2))
        .await
        .expect("expected websocket event")
}

pub async fn try_next_event(ws: &mut WsClient, wait: Duration) -> Option<Value> {
    loop {
        let frame = timeout(wait, ws.next()).await.ok()??.ok()?;
        match frame {
            TungsteniteMessage::Text(text) => {
                return Some(serde_json::from_str(text.as_str()).expect("event json"))
            }
            TungsteniteMessage::Close(_) => return None,
            _ => continue,
        }
    }
}

/// 读取事件直到出现指定名称
pub async fn expect_event(ws: &mut WsClient, name: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["event"] == name {
            return event;
        }
    }
}
