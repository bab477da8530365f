use application::{ConnectionSession, ServerEvent};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};

use crate::state::AppState;

/// 单个 WebSocket 连接的驱动
///
/// 入站帧交给 [`ConnectionSession`] 处理；出站事件经由会话在连接中心
/// 登记的通道写回客户端。服务端按固定间隔发送 Ping，任何入站帧（包括 Pong）
/// 都会刷新空闲期限；超过期限没有入站帧才断开。连接以任何方式结束都会走
/// 同一条关闭路径。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendEvent(ServerEvent),
    SendPing,
    SendPong(Bytes),
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState) -> Self {
        Self { socket, state }
    }

    pub async fn run(self) {
        let Self { socket, state } = self;
        let idle_timeout = state.settings.idle_timeout;
        let ping_interval = state.settings.ping_interval;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut session = ConnectionSession::open(
            state.relay.clone(),
            state.authenticator.clone(),
            event_tx,
        );
        let connection_id = session.handle();

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let outgoing = tokio::select! {
                    Some(event) = event_rx.recv() => WsCommand::SendEvent(event),
                    Some(cmd) = cmd_rx.recv() => cmd,
                    else => break,
                };

                let frame = match outgoing {
                    WsCommand::SendEvent(event) => match event.to_json() {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize websocket event");
                            continue;
                        }
                    },
                    WsCommand::SendPing => WsMessage::Ping(Bytes::new()),
                    WsCommand::SendPong(data) => WsMessage::Pong(data),
                };

                if sender.send(frame).await.is_err() {
                    tracing::debug!("websocket sender closed");
                    break;
                }
            }
        });

        let mut heartbeat = interval(ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval 的第一次 tick 立即完成，连接刚建立时不需要 Ping
        heartbeat.reset();
        let idle = sleep(idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = &mut send_task => break,
                _ = &mut idle => {
                    tracing::info!(connection_id = %connection_id, "idle timeout, closing connection");
                    break;
                }
                _ = heartbeat.tick() => {
                    if cmd_tx.send(WsCommand::SendPing).await.is_err() {
                        break;
                    }
                }
                next = incoming.next() => {
                    let message = match next {
                        None => break,
                        Some(Err(err)) => {
                            tracing::warn!(connection_id = %connection_id, error = %err, "websocket receive error");
                            break;
                        }
                        Some(Ok(message)) => message,
                    };
                    idle.as_mut().reset(Instant::now() + idle_timeout);

                    if !Self::handle_incoming(&mut session, message, &cmd_tx).await {
                        break;
                    }
                }
            }
        }

        let identity = session.close();
        send_task.abort();
        tracing::info!(
            connection_id = %connection_id,
            user_id = ?identity.as_ref().map(|id| id.as_str()),
            "websocket connection finished"
        );
    }

    /// 处理来自客户端的帧，返回 false 表示连接应关闭
    async fn handle_incoming(
        session: &mut ConnectionSession,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> bool {
        match message {
            WsMessage::Text(text) => {
                session.handle_text(text.as_str());
                true
            }
            WsMessage::Binary(_) => {
                session.reject(application::session::INVALID_EVENT);
                true
            }
            WsMessage::Ping(data) => cmd_tx.send(WsCommand::SendPong(data)).await.is_ok(),
            WsMessage::Pong(_) => true,
            WsMessage::Close(_) => false,
        }
    }
}
