pub mod health;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::interview::handlers;
use crate::speech::handlers as speech;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api", get(handlers::handle_api_root))
        // Interview turns (SSE)
        .route("/api/question/stream", post(handlers::handle_question_stream))
        .route("/api/extracting/info", post(handlers::handle_extracting_info))
        .route("/api/smallchat/stream", post(handlers::handle_smallchat_stream))
        // Interview JSON
        .route(
            "/api/extracting/profile",
            post(handlers::handle_extracting_profile),
        )
        .route("/api/interview/prompt", post(handlers::handle_interview_prompt))
        // Speech
        .route("/api/sts/token", post(speech::handle_sts_token))
        .route("/api/asr/ws", get(speech::handle_asr_ws))
        .layer(cors)
        .with_state(state)
}

/// Echoes allowed origins with credentials. `*` mirrors any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values = origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| warn!("Ignoring invalid CORS origin '{origin}'"))
                .ok()
        });
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
