use axum::body::{Body, Bytes};
use axum::extract::Multipart;
use axum::http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use fennel_core::client::{FilePart, MultipartForm, OperationKind, RelayOperation, RequestBody};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::types::{create_error_response, relay_error_response, ErrorType};
use crate::relay::engine::{RelayEngine, RelayResponse};

/// 请求体中唯一需要读取的字段
#[derive(Deserialize)]
struct ModelOnly {
    model: String,
}

/// 负载均衡的OpenAI兼容处理器
pub struct LoadBalancedHandler {
    engine: Arc<RelayEngine>,
}

impl LoadBalancedHandler {
    pub fn new(engine: Arc<RelayEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RelayEngine> {
        &self.engine
    }

    /// 处理 JSON 请求体的操作，原始字节除 model 字段外原样转发
    pub async fn handle_json(self: Arc<Self>, kind: OperationKind, body: Bytes) -> Response {
        let model_id = match serde_json::from_slice::<ModelOnly>(&body) {
            Ok(parsed) if !parsed.model.trim().is_empty() => parsed.model,
            Ok(_) => {
                return create_error_response(
                    ErrorType::BadRequest,
                    "Missing model field in request",
                    Some("The 'model' field must not be empty".to_string()),
                );
            }
            Err(e) => {
                tracing::debug!("Rejecting {} request: {}", kind, e);
                return create_error_response(
                    ErrorType::BadRequest,
                    "Invalid request body",
                    Some(format!("Expected a JSON object with a 'model' field: {e}")),
                );
            }
        };

        let Some(operation) = RelayOperation::json(kind, RequestBody::Raw(body)) else {
            return create_error_response(
                ErrorType::BadRequest,
                "This endpoint expects a multipart form",
                None,
            );
        };

        self.relay(operation, &model_id).await
    }

    /// 处理 multipart 表单的操作
    pub async fn handle_multipart(
        self: Arc<Self>,
        kind: OperationKind,
        mut multipart: Multipart,
    ) -> Response {
        let mut form = MultipartForm::default();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    return create_error_response(
                        ErrorType::BadRequest,
                        "Invalid multipart form",
                        Some(e.to_string()),
                    );
                }
            };

            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);

            if file_name.is_some() {
                match field.bytes().await {
                    Ok(data) => form.files.push(FilePart {
                        field: name,
                        file_name,
                        content_type,
                        data,
                    }),
                    Err(e) => {
                        return create_error_response(
                            ErrorType::BadRequest,
                            "Failed to read uploaded file",
                            Some(e.to_string()),
                        );
                    }
                }
                continue;
            }

            match field.text().await {
                Ok(value) if name == "model" => form.model = value,
                Ok(value) => form.fields.push((name, value)),
                Err(e) => {
                    return create_error_response(
                        ErrorType::BadRequest,
                        "Invalid multipart field",
                        Some(e.to_string()),
                    );
                }
            }
        }

        let model_id = form.model.clone();
        let Some(operation) = RelayOperation::multipart(kind, form) else {
            return create_error_response(
                ErrorType::BadRequest,
                "This endpoint expects a JSON body",
                None,
            );
        };

        self.relay(operation, &model_id).await
    }

    /// 模型列表：别名与当前可服务的模型键
    pub async fn handle_models(self: Arc<Self>) -> Response {
        let balancer = self.engine.balancer();
        let mut ids = balancer.get_model_mapping_keys();
        match balancer.served_model_keys().await {
            Ok(keys) => ids.extend(keys),
            Err(e) => {
                tracing::error!("Failed to list served models: {}", e);
                return create_error_response(
                    ErrorType::InternalServerError,
                    "Failed to list models",
                    None,
                );
            }
        }
        ids.sort();
        ids.dedup();

        let created = Utc::now().timestamp();
        let data: Vec<Value> = ids
            .into_iter()
            .map(|id| {
                json!({
                    "id": id,
                    "object": "model",
                    "created": created,
                    "owned_by": "fennel"
                })
            })
            .collect();

        Json(json!({
            "object": "list",
            "data": data
        }))
        .into_response()
    }

    async fn relay(&self, operation: RelayOperation, model_id: &str) -> Response {
        // 调用方断开时 handler future 被丢弃，guard 随之取消令牌
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        match self.engine.relay(operation, model_id, &cancel).await {
            Ok(relayed) => into_streaming_response(relayed),
            Err(e) => relay_error_response(&e),
        }
    }
}

fn into_streaming_response(relayed: RelayResponse) -> Response {
    let mut response = Response::new(Body::from_stream(relayed.body));
    *response.status_mut() = relayed.status;

    let headers = response.headers_mut();
    for (name, value) in relayed.headers.iter() {
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == CONNECTION {
            continue;
        }
        if name.as_str().eq_ignore_ascii_case("keep-alive") {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    response
}
