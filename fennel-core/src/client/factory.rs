use super::gemini::GeminiClient;
use super::openai::OpenAIClient;
use super::siliconflow::SiliconFlowClient;
use super::traits::{AdapterFactory, UpstreamAdapter};
use super::types::{ClientError, MultipartForm, RequestBody, UpstreamResponse};
use crate::channel::{Channel, ChannelType};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// 统一的客户端枚举，包装不同类型的上游客户端
#[derive(Clone)]
pub enum UnifiedClient {
    OpenAI(OpenAIClient),
    Gemini(GeminiClient),
    SiliconFlow(SiliconFlowClient),
}

#[async_trait]
impl UpstreamAdapter for UnifiedClient {
    fn channel_type(&self) -> ChannelType {
        match self {
            UnifiedClient::OpenAI(client) => client.channel_type(),
            UnifiedClient::Gemini(client) => client.channel_type(),
            UnifiedClient::SiliconFlow(client) => client.channel_type(),
        }
    }

    fn base_url(&self) -> &str {
        match self {
            UnifiedClient::OpenAI(client) => client.base_url(),
            UnifiedClient::Gemini(client) => client.base_url(),
            UnifiedClient::SiliconFlow(client) => client.base_url(),
        }
    }

    async fn chat_completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.chat_completions(body).await,
            UnifiedClient::Gemini(client) => client.chat_completions(body).await,
            UnifiedClient::SiliconFlow(client) => client.chat_completions(body).await,
        }
    }

    async fn completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.completions(body).await,
            UnifiedClient::Gemini(client) => client.completions(body).await,
            UnifiedClient::SiliconFlow(client) => client.completions(body).await,
        }
    }

    async fn embeddings(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.embeddings(body).await,
            UnifiedClient::Gemini(client) => client.embeddings(body).await,
            UnifiedClient::SiliconFlow(client) => client.embeddings(body).await,
        }
    }

    async fn speech(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.speech(body).await,
            UnifiedClient::Gemini(client) => client.speech(body).await,
            UnifiedClient::SiliconFlow(client) => client.speech(body).await,
        }
    }

    async fn transcriptions(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.transcriptions(form).await,
            UnifiedClient::Gemini(client) => client.transcriptions(form).await,
            UnifiedClient::SiliconFlow(client) => client.transcriptions(form).await,
        }
    }

    async fn translations(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.translations(form).await,
            UnifiedClient::Gemini(client) => client.translations(form).await,
            UnifiedClient::SiliconFlow(client) => client.translations(form).await,
        }
    }

    async fn image_generations(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.image_generations(body).await,
            UnifiedClient::Gemini(client) => client.image_generations(body).await,
            UnifiedClient::SiliconFlow(client) => client.image_generations(body).await,
        }
    }

    async fn image_edits(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.image_edits(form).await,
            UnifiedClient::Gemini(client) => client.image_edits(form).await,
            UnifiedClient::SiliconFlow(client) => client.image_edits(form).await,
        }
    }

    async fn image_variations(&self, form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        match self {
            UnifiedClient::OpenAI(client) => client.image_variations(form).await,
            UnifiedClient::Gemini(client) => client.image_variations(form).await,
            UnifiedClient::SiliconFlow(client) => client.image_variations(form).await,
        }
    }
}

/// 客户端工厂
///
/// 所有渠道共享同一个 reqwest 连接池。
#[derive(Clone)]
pub struct ClientFactory {
    http: Client,
}

impl ClientFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http }
    }

    /// 根据渠道类型创建客户端
    pub fn create_client(&self, channel: &Channel) -> UnifiedClient {
        let base_url = channel.base_url.clone();
        let api_key = channel.api_key.clone();
        match channel.channel_type {
            ChannelType::OpenAI => {
                UnifiedClient::OpenAI(OpenAIClient::with_client(self.http.clone(), base_url, api_key))
            }
            ChannelType::Gemini => {
                UnifiedClient::Gemini(GeminiClient::with_client(self.http.clone(), base_url, api_key))
            }
            ChannelType::SiliconFlow => UnifiedClient::SiliconFlow(SiliconFlowClient::with_client(
                self.http.clone(),
                base_url,
                api_key,
            )),
        }
    }
}

impl AdapterFactory for ClientFactory {
    fn create(&self, channel: &Channel) -> Result<Arc<dyn UpstreamAdapter>, ClientError> {
        if channel.api_key.is_empty() {
            return Err(ClientError::InvalidRequest(format!(
                "channel {} has no api key",
                channel.id
            )));
        }
        Ok(Arc::new(self.create_client(channel)))
    }
}
