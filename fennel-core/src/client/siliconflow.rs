use super::openai::OpenAIClient;
use super::traits::UpstreamAdapter;
use super::types::{ClientError, MultipartForm, OperationKind, RequestBody, UpstreamResponse};
use crate::channel::ChannelType;
use async_trait::async_trait;
use reqwest::Client;

/// SiliconFlow 客户端，OpenAI 线格式，不支持图片编辑和变体
#[derive(Clone)]
pub struct SiliconFlowClient {
    inner: OpenAIClient,
}

impl SiliconFlowClient {
    pub fn with_client(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            inner: OpenAIClient::with_client(client, base_url, api_key),
        }
    }
}

#[async_trait]
impl UpstreamAdapter for SiliconFlowClient {
    fn channel_type(&self) -> ChannelType {
        ChannelType::SiliconFlow
    }

    fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    async fn chat_completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_json(OperationKind::ChatCompletion, body).await
    }

    async fn completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_json(OperationKind::Completion, body).await
    }

    async fn embeddings(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_json(OperationKind::Embeddings, body).await
    }

    async fn speech(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_json(OperationKind::Speech, body).await
    }

    async fn transcriptions(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_multipart(OperationKind::Transcription, form).await
    }

    async fn translations(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_multipart(OperationKind::Translation, form).await
    }

    async fn image_generations(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_json(OperationKind::ImageGeneration, body).await
    }
}
