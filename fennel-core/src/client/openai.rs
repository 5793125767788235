use super::traits::UpstreamAdapter;
use super::types::{ClientError, MultipartForm, OperationKind, RequestBody, UpstreamResponse};
use crate::channel::ChannelType;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// OpenAI 兼容客户端
///
/// Gemini 与 SiliconFlow 客户端都复用它，只是路径前缀和支持的操作不同。
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
    api_key: String,
    path_prefix: &'static str,
}

impl OpenAIClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self::with_base_url_and_timeout(base_url, api_key, Duration::from_secs(30))
    }

    pub fn with_base_url_and_timeout(
        base_url: String,
        api_key: String,
        connect_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout) // 只设置连接超时，不限制总请求时间
            .build()
            .unwrap_or_else(|_| Client::new());

        Self::with_client(client, base_url, api_key)
    }

    /// 复用已有的连接池
    pub fn with_client(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            path_prefix: "v1",
        }
    }

    pub(crate) fn with_path_prefix(mut self, path_prefix: &'static str) -> Self {
        self.path_prefix = path_prefix;
        self
    }

    pub fn endpoint(&self, kind: OperationKind) -> String {
        format!("{}/{}/{}", self.base_url, self.path_prefix, kind.path())
    }

    fn auth_headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.api_key);
        headers.insert(
            AUTHORIZATION,
            auth_value.parse().map_err(|e| {
                ClientError::HeaderParseError(format!("Invalid authorization header: {}", e))
            })?,
        );
        Ok(headers)
    }

    pub(crate) async fn post_json(
        &self,
        kind: OperationKind,
        body: RequestBody,
    ) -> Result<UpstreamResponse, ClientError> {
        let url = self.endpoint(kind);
        debug!("POST {} ({})", url, kind);

        let mut headers = self.auth_headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body.to_bytes()?)
            .send()
            .await?;

        UpstreamResponse::from_reqwest(response).await
    }

    pub(crate) async fn post_multipart(
        &self,
        kind: OperationKind,
        form: MultipartForm,
    ) -> Result<UpstreamResponse, ClientError> {
        let url = self.endpoint(kind);
        debug!("POST {} ({}, multipart)", url, kind);

        let response = self
            .client
            .post(url)
            .headers(self.auth_headers()?)
            .multipart(form.to_reqwest_form()?)
            .send()
            .await?;

        UpstreamResponse::from_reqwest(response).await
    }
}

#[async_trait]
impl UpstreamAdapter for OpenAIClient {
    fn channel_type(&self) -> ChannelType {
        ChannelType::OpenAI
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn chat_completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.post_json(OperationKind::ChatCompletion, body).await
    }

    async fn completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.post_json(OperationKind::Completion, body).await
    }

    async fn embeddings(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.post_json(OperationKind::Embeddings, body).await
    }

    async fn speech(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.post_json(OperationKind::Speech, body).await
    }

    async fn transcriptions(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        self.post_multipart(OperationKind::Transcription, form).await
    }

    async fn translations(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        self.post_multipart(OperationKind::Translation, form).await
    }

    async fn image_generations(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.post_json(OperationKind::ImageGeneration, body).await
    }

    async fn image_edits(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        self.post_multipart(OperationKind::ImageEdit, form).await
    }

    async fn image_variations(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        self.post_multipart(OperationKind::ImageVariation, form).await
    }
}
