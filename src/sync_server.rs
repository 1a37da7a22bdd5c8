//! HTTP surface for the story manifest plus the push channel upgrade.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::error::Result;
use crate::manifest::{ManifestStore, StoryFileRecord};
use crate::push_channel::{serve_socket, ChannelRegistry, PushMessage};

pub const INVALID_STORY_MESSAGE: &str = "Invalid story id provided!";
pub const CLEARED_STORY_MESSAGE: &str = "Cleared story";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ManifestStore>,
    pub channels: Arc<ChannelRegistry>,
}

impl AppState {
    pub fn new(store: Arc<ManifestStore>, channels: Arc<ChannelRegistry>) -> Self {
        Self { store, channels }
    }
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Body of `POST /stories`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoryCommand {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    UnknownStory,
    UnknownCommand(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownStory => StatusCode::NOT_FOUND,
            ApiError::UnknownCommand(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::UnknownStory => INVALID_STORY_MESSAGE.to_string(),
            ApiError::UnknownCommand(kind) => format!("Unknown command type: {}", kind),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(push_channel_handler))
        .route("/stories", get(list_stories_handler).post(story_command_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn list_stories_handler(
    State(state): State<AppState>,
) -> Json<DataResponse<Vec<StoryFileRecord>>> {
    Json(DataResponse {
        data: state.store.list().await,
    })
}

async fn story_command_handler(
    State(state): State<AppState>,
    Json(command): Json<StoryCommand>,
) -> std::result::Result<Response, ApiError> {
    match command.command_type.as_str() {
        "selectStory" => {
            let id = command.payload.as_str().ok_or(ApiError::UnknownStory)?;
            let record = select_story(&state.store, id)
                .await
                .ok_or(ApiError::UnknownStory)?;
            // TODO: broadcast the selection once clients handle a selectStory push message
            Ok(Json(DataResponse { data: record }).into_response())
        }
        "clearStory" => {
            let delivered = state.channels.broadcast(PushMessage::ClearStory).await;
            tracing::info!(delivered, "Cleared story on push clients");
            Ok(Json(DataResponse {
                data: CLEARED_STORY_MESSAGE,
            })
            .into_response())
        }
        other => Err(ApiError::UnknownCommand(other.to_string())),
    }
}

async fn push_channel_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state.channels))
}

/// Resolve a file id, or a story id, to its file record in the live manifest.
pub async fn select_story(store: &ManifestStore, id: &str) -> Option<StoryFileRecord> {
    match store.get(id).await {
        Some(record) => Some(record),
        None => store.find_story(id).await,
    }
}

/// Serve until `shutdown` flips, then close every push client.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let channels = state.channels.clone();
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on http://{}", addr);
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            tracing::info!("Sync server shutting down");
            channels.close_all().await;
        })
        .await?;
    Ok(())
}
