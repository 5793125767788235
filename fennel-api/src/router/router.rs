use crate::app::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::{
    health::health_check,
    models::list_models_v1,
    relay::{
        audio_speech, audio_transcriptions, audio_translations, chat_completions, completions,
        embeddings, image_edits, image_generations, image_variations,
    },
};

/// 上传音频和图片时的请求体上限
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// 创建应用路由
pub fn create_app_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .nest("/v1", create_v1_routes())
        .layer(TraceLayer::new_for_http())
}

/// 创建 v1 API 路由
fn create_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/models", get(list_models_v1))
        .route("/chat/completions", post(chat_completions))
        .route("/completions", post(completions))
        .route("/embeddings", post(embeddings))
        .route("/audio/speech", post(audio_speech))
        .route("/audio/transcriptions", post(audio_transcriptions))
        .route("/audio/translations", post(audio_translations))
        .route("/images/generations", post(image_generations))
        .route("/images/edits", post(image_edits))
        .route("/images/variations", post(image_variations))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// 首页处理器
pub async fn index() -> &'static str {
    "Fennel - Load Balanced LLM Relay Gateway"
}
