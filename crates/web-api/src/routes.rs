use std::{fmt::Display, str::FromStr};

use application::MessageDto;
use axum::{
    extract::{rejection::QueryRejection, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use domain::HistoryLimit;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws_connection};

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    user_id: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    user_id: Option<i64>,
}

/// `?limit=` 这类空参数视为未提供
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/messages/history", get(get_history))
        .route("/users/status", get(get_user_status))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(inner)| inner)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// 历史消息：带 user_id 时返回与该用户的会话并将对方发来的已投递消息标记为已读，
/// 否则返回调用方收发的全部消息。
async fn get_history(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let query = parse_query(query)?;
    let limit = query.limit.unwrap_or(HistoryLimit::DEFAULT);

    let messages = match query.user_id {
        None => {
            state
                .message_service
                .get_user_messages(caller.value(), limit)
                .await?
        }
        Some(peer) if peer <= 0 => {
            return Err(ApiError::bad_request("user_id must be a positive integer"));
        }
        Some(peer) => {
            let messages = state
                .message_service
                .get_conversation(caller.value(), peer, limit)
                .await?;
            if let Err(err) = state.message_service.mark_read(peer, caller.value()).await {
                tracing::warn!(user_id = %caller, peer_id = peer, error = %err, "failed to mark messages read");
            }
            messages
        }
    };

    Ok(Json(messages.iter().map(MessageDto::from).collect()))
}

async fn get_user_status(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = parse_query(query)?;
    let response = match query.user_id {
        Some(user_id) => {
            let status = state.status_service.get_status(user_id).await?;
            Json(vec![status]).into_response()
        }
        None => Json(state.status_service.get_all_statuses().await?).into_response(),
    };
    Ok(response)
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let max_bytes = state.websocket.max_message_bytes;
    ws.max_message_size(max_bytes)
        .max_frame_size(max_bytes)
        .on_upgrade(move |socket| ws_connection::serve(socket, state, user_id))
}
