use crate::agent::ReasoningAgent;
use crate::session::SessionError;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Json,
    Router,
    extract::State,
    response::{ IntoResponse, Response },
    http::StatusCode,
};
use serde::{ Deserialize, Serialize };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
struct AppState {
    agent: Arc<ReasoningAgent>,
}

pub fn router(agent: Arc<ReasoningAgent>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/session", get(session_handler))
        .route("/api/load", get(load_handler))
        .route("/api/query", post(query_handler))
        .route("/api/reload", post(reload_handler))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .layer(cors)
        .with_state(AppState { agent })
}

pub async fn start_http_server(
    http_port: u16,
    agent: Arc<ReasoningAgent>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(agent);
    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    error!("HTTP server error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            }
        }
    });

    info!("HTTP server started");
    Ok(())
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(ErrorBody { error: message.into() })).into_response()
}

async fn session_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.agent.view().await)
}

async fn load_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.agent.snapshot().await)
}

async fn query_handler(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>
) -> Response {
    let request = match state.agent.submit(&req.query).await {
        Ok(request) => request,
        Err(e @ SessionError::TurnInProgress) => {
            return error_response(StatusCode::CONFLICT, e.to_string());
        }
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    state.agent.run_turn(&request).await;
    match state.agent.message(&request.message_id).await {
        Some(message) => Json(message).into_response(),
        None =>
            error_response(
                StatusCode::GONE,
                format!("Conversation for {} was deleted during the turn", request.message_id)
            ),
    }
}

async fn reload_handler(State(state): State<AppState>) -> Response {
    match state.agent.reload().await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Reload failed: {}", e)),
    }
}

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (code, success, message) = match state.agent.reload_prompts().await {
        Ok(true) => (StatusCode::OK, true, "Prompts reloaded".to_string()),
        Ok(false) => (StatusCode::OK, true, "Prompts unchanged".to_string()),
        Err(e) => (StatusCode::BAD_REQUEST, false, format!("Prompt reload error: {}", e)),
    };
    (code, Json(ReloadResponse { success, message }))
}
