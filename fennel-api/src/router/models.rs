use crate::app::AppState;
use axum::extract::State;
use axum::response::Response;

/// V1 API: 模型列表（别名与当前可服务的模型键）
pub async fn list_models_v1(State(state): State<AppState>) -> Response {
    state.handler.clone().handle_models().await
}
