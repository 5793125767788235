use crate::app::AppState;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::response::Response;
use fennel_core::client::OperationKind;

/// V1 API: 聊天完成
pub async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    state
        .handler
        .clone()
        .handle_json(OperationKind::ChatCompletion, body)
        .await
}

pub async fn completions(State(state): State<AppState>, body: Bytes) -> Response {
    state
        .handler
        .clone()
        .handle_json(OperationKind::Completion, body)
        .await
}

pub async fn embeddings(State(state): State<AppState>, body: Bytes) -> Response {
    state
        .handler
        .clone()
        .handle_json(OperationKind::Embeddings, body)
        .await
}

pub async fn audio_speech(State(state): State<AppState>, body: Bytes) -> Response {
    state
        .handler
        .clone()
        .handle_json(OperationKind::Speech, body)
        .await
}

pub async fn image_generations(State(state): State<AppState>, body: Bytes) -> Response {
    state
        .handler
        .clone()
        .handle_json(OperationKind::ImageGeneration, body)
        .await
}

pub async fn audio_transcriptions(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Response {
    state
        .handler
        .clone()
        .handle_multipart(OperationKind::Transcription, multipart)
        .await
}

pub async fn audio_translations(State(state): State<AppState>, multipart: Multipart) -> Response {
    state
        .handler
        .clone()
        .handle_multipart(OperationKind::Translation, multipart)
        .await
}

pub async fn image_edits(State(state): State<AppState>, multipart: Multipart) -> Response {
    state
        .handler
        .clone()
        .handle_multipart(OperationKind::ImageEdit, multipart)
        .await
}

pub async fn image_variations(State(state): State<AppState>, multipart: Multipart) -> Response {
    state
        .handler
        .clone()
        .handle_multipart(OperationKind::ImageVariation, multipart)
        .await
}
