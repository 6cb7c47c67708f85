//! HTTP server: webhook ingress for every tenant bot and the master bot,
//! health endpoints and dashboard login.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use teloxide::types::Update;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use boothcore::auth::{LoginCheck, LoginCodeService, TelegramAuthData};
use boothcore::error::AppError;

use crate::masterbot::MasterBot;
use crate::registry::{BotRegistry, WebhookError};

/// Shared state for the web server.
#[derive(Clone)]
pub struct ServerState {
    pub registry: Arc<BotRegistry>,
    pub master: Option<Arc<MasterBot>>,
    pub login: Option<Arc<LoginCodeService>>,
    /// Master bot token, the key for login-widget signatures
    pub master_token: Option<String>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/webhook/{bot_id}", post(webhook_handler))
        .route("/master/webhook", post(master_webhook_handler))
        .route("/api/auth/telegram-link/init", post(login_init_handler))
        .route("/api/auth/telegram-link/check", get(login_check_handler))
        .route("/api/auth/telegram", post(telegram_widget_handler))
        .with_state(state)
}

/// Serves until `shutdown` is cancelled
pub async fn start_server(port: u16, state: ServerState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state);

    tracing::info!("Starting web server on http://{}", addr);
    tracing::info!("  /webhook/{{bot_id}}  - Tenant bot updates");
    tracing::info!("  /master/webhook     - Master bot updates");
    tracing::info!("  /api/auth/...       - Dashboard login");
    tracing::info!("  /health             - Health check");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

fn failure(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "success": false, "error": error }))).into_response()
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": "BoothBot API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// POST /webhook/{bot_id}
async fn webhook_handler(Path(bot_id): Path<String>, State(state): State<ServerState>, body: Bytes) -> Response {
    match state.registry.handle_webhook(&bot_id, &body).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => {
            let status = match &e {
                WebhookError::BotNotFound(_) => {
                    tracing::warn!(bot_id = %bot_id, "Webhook for unknown bot");
                    return (StatusCode::NOT_FOUND, Json(json!({ "ok": false, "error": "Bot not found" })))
                        .into_response();
                }
                WebhookError::InvalidUpdate(_) => StatusCode::BAD_REQUEST,
                WebhookError::Connect(_) | WebhookError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::error!(bot_id = %bot_id, "Webhook failed: {}", e);
            (status, Json(json!({ "ok": false, "error": e.to_string() }))).into_response()
        }
    }
}

/// POST /master/webhook
async fn master_webhook_handler(State(state): State<ServerState>, body: Bytes) -> Response {
    let Some(master) = state.master.as_ref() else {
        return (StatusCode::NOT_FOUND, Json(json!({ "ok": false, "error": "Master bot disabled" }))).into_response();
    };
    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => {
            master.handle_update(&update).await;
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "ok": false, "error": e.to_string() }))).into_response(),
    }
}

/// POST /api/auth/telegram-link/init
async fn login_init_handler(State(state): State<ServerState>) -> Response {
    let Some(login) = state.login.as_ref() else {
        return failure(StatusCode::SERVICE_UNAVAILABLE, "Telegram login is not configured");
    };
    match login.init().await {
        Ok(init) => Json(json!({ "success": true, "data": init })).into_response(),
        Err(e) => {
            tracing::error!("Failed to create login code: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create login code")
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckQuery {
    code: Option<String>,
}

/// GET /api/auth/telegram-link/check?code=
async fn login_check_handler(State(state): State<ServerState>, Query(query): Query<CheckQuery>) -> Response {
    let Some(login) = state.login.as_ref() else {
        return failure(StatusCode::SERVICE_UNAVAILABLE, "Telegram login is not configured");
    };
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "Code is required");
    };

    match login.check(&code).await {
        Ok(LoginCheck::Pending) => Json(json!({ "success": true, "status": "pending" })).into_response(),
        Ok(LoginCheck::Denied) => Json(json!({ "success": true, "status": "denied" })).into_response(),
        Ok(LoginCheck::Approved { token, tenant }) => Json(json!({
            "success": true,
            "status": "approved",
            "data": { "token": token, "tenant": tenant },
        }))
        .into_response(),
        Ok(LoginCheck::Expired) => failure(StatusCode::GONE, "Code expired"),
        Ok(LoginCheck::NotFound) => failure(StatusCode::NOT_FOUND, "Invalid code"),
        Err(e) => {
            tracing::error!("Login check failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Login check failed")
        }
    }
}

/// POST /api/auth/telegram
async fn telegram_widget_handler(State(state): State<ServerState>, Json(data): Json<TelegramAuthData>) -> Response {
    let (Some(login), Some(bot_token)) = (state.login.as_ref(), state.master_token.as_deref()) else {
        return failure(StatusCode::SERVICE_UNAVAILABLE, "Telegram login is not configured");
    };

    match login.login_with_widget(&data, bot_token).await {
        Ok((token, tenant)) => {
            Json(json!({ "success": true, "data": { "token": token, "tenant": tenant } })).into_response()
        }
        Err(AppError::Validation(reason)) => {
            tracing::info!(telegram_id = data.id, "Rejected login widget payload: {}", reason);
            failure(StatusCode::UNAUTHORIZED, "Invalid Telegram authentication")
        }
        Err(e) => {
            tracing::error!("Widget login failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
        }
    }
}
