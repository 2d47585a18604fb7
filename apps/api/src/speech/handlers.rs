//! Axum route handlers for speech: token issuance and the audio socket.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::speech::proxy::{serve_connection, ClientSocket};
use crate::state::AppState;

/// Credentials default to the server's own when omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub appid: Option<String>,
    pub access_key: Option<String>,
}

/// POST /api/sts/token
///
/// Returns the vendor's token response verbatim.
pub async fn handle_sts_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<Value>, AppError> {
    let pick = |given: Option<String>, configured: &Option<String>| {
        given
            .filter(|v| !v.trim().is_empty())
            .or_else(|| configured.clone())
    };
    let speech = &state.config.speech;
    let (Some(appid), Some(access_key)) = (
        pick(request.appid, &speech.app_id),
        pick(request.access_key, &speech.access_key),
    ) else {
        return Err(AppError::Validation(
            "appid and accessKey are required".to_string(),
        ));
    };

    let body = state
        .speech
        .issue_token(&appid, &access_key)
        .await
        .map_err(|e| AppError::Upstream(format!("Speech token request failed: {e}")))?;

    Ok(Json(body))
}

/// GET /api/asr/ws
///
/// Upgrades to a WebSocket and proxies it to the recognition service.
pub async fn handle_asr_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let connector = state.connector.clone();
    let policy = state.config.audio_config_policy;
    let idle_timeout = state.config.audio_idle_timeout;

    ws.on_upgrade(move |socket| async move {
        let mut client = ClientSocket::new(socket);
        serve_connection(&mut client, connector.as_ref(), policy, idle_timeout).await;
    })
}
