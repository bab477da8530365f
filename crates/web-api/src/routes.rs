use axum::{
    extract::{rejection::JsonRejection, ws::WebSocketUpgrade, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;

use application::{ConversationDto, CreateMessageRequest, MessageDto};
use domain::MessageId;

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

// 缺省字段按空串处理，交给服务层统一校验
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessagePayload {
    #[serde(default)]
    receiver_id: String,
    #[serde(default)]
    content: String,
    message_type: Option<String>,
    file_url: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/messages", message_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

fn message_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_message))
        .route("/conversations", get(list_conversations))
        .route("/{id}", get(list_history))
        .route("/{id}/read", patch(mark_read))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(origin = %origin, error = %err, "ignoring invalid cors origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ConversationDto>>, ApiError> {
    let items = state
        .conversation_service
        .list_conversations(&user_id)
        .await?;

    Ok(Json(items))
}

async fn list_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(counterpart_id): Path<String>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let items = state
        .conversation_service
        .list_history(&user_id, &counterpart_id)
        .await?;

    Ok(Json(items))
}

async fn create_message(
    State(state): State<AppState>,
    AuthUser(sender_id): AuthUser,
    payload: Result<Json<CreateMessagePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let Json(payload) = payload?;
    let dto = state
        .conversation_service
        .create_message(CreateMessageRequest {
            sender_id,
            receiver_id: payload.receiver_id,
            content: payload.content,
            message_type: payload.message_type,
            file_url: payload.file_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(reader_id): AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<MessageDto>, ApiError> {
    // 格式错误的 id 与不存在的消息同样返回 404
    let message_id = Uuid::parse_str(&message_id)
        .map(MessageId::from)
        .map_err(|_| ApiError::not_found())?;

    let dto = state
        .conversation_service
        .mark_read(message_id, &reader_id)
        .await?;

    Ok(Json(dto))
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let limit = state.settings.max_frame_bytes;
    ws.max_frame_size(limit)
        .max_message_size(limit)
        .on_upgrade(move |socket| WebSocketConnection::new(socket, state).run())
}
