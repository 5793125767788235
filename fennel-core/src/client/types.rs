use crate::channel::ChannelType;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 上游诊断信息最多保留的字节数
const UPSTREAM_ERROR_BODY_LIMIT: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },
    #[error("{kind} is not supported by {channel_type} channels")]
    Unsupported {
        kind: OperationKind,
        channel_type: ChannelType,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("header parse error: {0}")]
    HeaderParseError(String),
}

/// 响应体流，原样转发给调用方
pub type BodyStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// 上游成功响应：状态码、响应头和未消费的响应体
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl UpstreamResponse {
    /// 非 2xx 状态转换为 `ClientError::Upstream`，并截取部分响应体
    pub async fn from_reqwest(response: reqwest::Response) -> Result<Self, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > UPSTREAM_ERROR_BODY_LIMIT {
                let mut cut = UPSTREAM_ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ClientError::Upstream { status, body });
        }

        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(ClientError::from).boxed();
        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

/// 操作类型
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    ChatCompletion,
    Completion,
    Embeddings,
    Speech,
    Transcription,
    Translation,
    ImageGeneration,
    ImageEdit,
    ImageVariation,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::ChatCompletion,
        OperationKind::Completion,
        OperationKind::Embeddings,
        OperationKind::Speech,
        OperationKind::Transcription,
        OperationKind::Translation,
        OperationKind::ImageGeneration,
        OperationKind::ImageEdit,
        OperationKind::ImageVariation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ChatCompletion => "chat-completion",
            OperationKind::Completion => "completion",
            OperationKind::Embeddings => "embeddings",
            OperationKind::Speech => "speech",
            OperationKind::Transcription => "transcription",
            OperationKind::Translation => "translation",
            OperationKind::ImageGeneration => "image-generation",
            OperationKind::ImageEdit => "image-edit",
            OperationKind::ImageVariation => "image-variation",
        }
    }

    /// OpenAI 兼容接口的相对路径
    pub fn path(&self) -> &'static str {
        match self {
            OperationKind::ChatCompletion => "chat/completions",
            OperationKind::Completion => "completions",
            OperationKind::Embeddings => "embeddings",
            OperationKind::Speech => "audio/speech",
            OperationKind::Transcription => "audio/transcriptions",
            OperationKind::Translation => "audio/translations",
            OperationKind::ImageGeneration => "images/generations",
            OperationKind::ImageEdit => "images/edits",
            OperationKind::ImageVariation => "images/variations",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON 请求体，可以是已解析的值，也可以是调用方的原始字节
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Raw(Bytes),
}

impl RequestBody {
    /// 原始字节必须是 JSON 对象
    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            RequestBody::Json(value) => ensure_object(value),
            RequestBody::Raw(bytes) => parse_object(bytes).map(|_| ()),
        }
    }

    pub fn model(&self) -> Option<String> {
        match self {
            RequestBody::Json(value) => model_of(value),
            RequestBody::Raw(bytes) => parse_object(bytes).ok().and_then(|v| model_of(&v)),
        }
    }

    /// 替换 model 字段，其他字段保持原值
    pub fn with_model(&self, model_key: &str) -> Result<Self, ClientError> {
        match self {
            RequestBody::Json(value) => {
                ensure_object(value)?;
                let mut value = value.clone();
                value["model"] = Value::String(model_key.to_string());
                Ok(RequestBody::Json(value))
            }
            RequestBody::Raw(bytes) => {
                let mut value = parse_object(bytes)?;
                value["model"] = Value::String(model_key.to_string());
                let encoded = serde_json::to_vec(&value)
                    .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
                Ok(RequestBody::Raw(Bytes::from(encoded)))
            }
        }
    }

    /// 序列化为发送给上游的字节
    pub fn to_bytes(&self) -> Result<Bytes, ClientError> {
        match self {
            RequestBody::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| ClientError::InvalidRequest(e.to_string())),
            RequestBody::Raw(bytes) => Ok(bytes.clone()),
        }
    }
}

fn model_of(value: &Value) -> Option<String> {
    value.get("model").and_then(|v| v.as_str()).map(str::to_string)
}

fn ensure_object(value: &Value) -> Result<(), ClientError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ClientError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        ))
    }
}

fn parse_object(bytes: &[u8]) -> Result<Value, ClientError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ClientError::InvalidRequest(format!("request body is not valid JSON: {e}")))?;
    ensure_object(&value)?;
    Ok(value)
}

/// multipart 表单中的文件
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// 音频转写、图片编辑等接口使用的 multipart 表单
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultipartForm {
    pub model: String,
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.model.trim().is_empty() {
            return Err(ClientError::InvalidRequest(
                "multipart form is missing the 'model' field".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_model(&self, model_key: &str) -> Self {
        Self {
            model: model_key.to_string(),
            ..self.clone()
        }
    }

    pub fn to_reqwest_form(&self) -> Result<reqwest::multipart::Form, ClientError> {
        let mut form = reqwest::multipart::Form::new().text("model", self.model.clone());
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let mut part = reqwest::multipart::Part::bytes(file.data.to_vec());
            if let Some(file_name) = &file.file_name {
                part = part.file_name(file_name.clone());
            }
            if let Some(content_type) = &file.content_type {
                part = part.mime_str(content_type)?;
            }
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

/// 一次转发操作：变体即操作类型，负载即请求内容
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOperation {
    ChatCompletion(RequestBody),
    Completion(RequestBody),
    Embeddings(RequestBody),
    Speech(RequestBody),
    Transcription(MultipartForm),
    Translation(MultipartForm),
    ImageGeneration(RequestBody),
    ImageEdit(MultipartForm),
    ImageVariation(MultipartForm),
}

impl RelayOperation {
    /// JSON 类操作，multipart 类返回 `None`
    pub fn json(kind: OperationKind, body: RequestBody) -> Option<Self> {
        match kind {
            OperationKind::ChatCompletion => Some(RelayOperation::ChatCompletion(body)),
            OperationKind::Completion => Some(RelayOperation::Completion(body)),
            OperationKind::Embeddings => Some(RelayOperation::Embeddings(body)),
            OperationKind::Speech => Some(RelayOperation::Speech(body)),
            OperationKind::ImageGeneration => Some(RelayOperation::ImageGeneration(body)),
            OperationKind::Transcription
            | OperationKind::Translation
            | OperationKind::ImageEdit
            | OperationKind::ImageVariation => None,
        }
    }

    /// multipart 类操作，JSON 类返回 `None`
    pub fn multipart(kind: OperationKind, form: MultipartForm) -> Option<Self> {
        match kind {
            OperationKind::Transcription => Some(RelayOperation::Transcription(form)),
            OperationKind::Translation => Some(RelayOperation::Translation(form)),
            OperationKind::ImageEdit => Some(RelayOperation::ImageEdit(form)),
            OperationKind::ImageVariation => Some(RelayOperation::ImageVariation(form)),
            OperationKind::ChatCompletion
            | OperationKind::Completion
            | OperationKind::Embeddings
            | OperationKind::Speech
            | OperationKind::ImageGeneration => None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            RelayOperation::ChatCompletion(_) => OperationKind::ChatCompletion,
            RelayOperation::Completion(_) => OperationKind::Completion,
            RelayOperation::Embeddings(_) => OperationKind::Embeddings,
            RelayOperation::Speech(_) => OperationKind::Speech,
            RelayOperation::Transcription(_) => OperationKind::Transcription,
            RelayOperation::Translation(_) => OperationKind::Translation,
            RelayOperation::ImageGeneration(_) => OperationKind::ImageGeneration,
            RelayOperation::ImageEdit(_) => OperationKind::ImageEdit,
            RelayOperation::ImageVariation(_) => OperationKind::ImageVariation,
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        match self {
            RelayOperation::ChatCompletion(body)
            | RelayOperation::Completion(body)
            | RelayOperation::Embeddings(body)
            | RelayOperation::Speech(body)
            | RelayOperation::ImageGeneration(body) => body.validate(),
            RelayOperation::Transcription(form)
            | RelayOperation::Translation(form)
            | RelayOperation::ImageEdit(form)
            | RelayOperation::ImageVariation(form) => form.validate(),
        }
    }

    /// 调用方请求的模型
    pub fn requested_model(&self) -> Option<String> {
        match self {
            RelayOperation::ChatCompletion(body)
            | RelayOperation::Completion(body)
            | RelayOperation::Embeddings(body)
            | RelayOperation::Speech(body)
            | RelayOperation::ImageGeneration(body) => body.model(),
            RelayOperation::Transcription(form)
            | RelayOperation::Translation(form)
            | RelayOperation::ImageEdit(form)
            | RelayOperation::ImageVariation(form) => Some(form.model.clone()),
        }
    }

    /// 将模型字段改写为选中的模型键
    pub fn with_model(&self, model_key: &str) -> Result<Self, ClientError> {
        Ok(match self {
            RelayOperation::ChatCompletion(body) => {
                RelayOperation::ChatCompletion(body.with_model(model_key)?)
            }
            RelayOperation::Completion(body) => {
                RelayOperation::Completion(body.with_model(model_key)?)
            }
            RelayOperation::Embeddings(body) => {
                RelayOperation::Embeddings(body.with_model(model_key)?)
            }
            RelayOperation::Speech(body) => RelayOperation::Speech(body.with_model(model_key)?),
            RelayOperation::ImageGeneration(body) => {
                RelayOperation::ImageGeneration(body.with_model(model_key)?)
            }
            RelayOperation::Transcription(form) => {
                RelayOperation::Transcription(form.with_model(model_key))
            }
            RelayOperation::Translation(form) => {
                RelayOperation::Translation(form.with_model(model_key))
            }
            RelayOperation::ImageEdit(form) => RelayOperation::ImageEdit(form.with_model(model_key)),
            RelayOperation::ImageVariation(form) => {
                RelayOperation::ImageVariation(form.with_model(model_key))
            }
        })
    }
}
