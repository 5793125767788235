use super::openai::OpenAIClient;
use super::traits::UpstreamAdapter;
use super::types::{ClientError, OperationKind, RequestBody, UpstreamResponse};
use crate::channel::ChannelType;
use async_trait::async_trait;
use reqwest::Client;

/// Gemini 客户端，走 Google 的 OpenAI 兼容端点
///
/// 该端点只提供对话、向量和图片生成。
#[derive(Clone)]
pub struct GeminiClient {
    inner: OpenAIClient,
}

impl GeminiClient {
    pub fn with_client(client: Client, base_url: String, api_key: String) -> Self {
        Self {
            inner: OpenAIClient::with_client(client, base_url, api_key)
                .with_path_prefix("v1beta/openai"),
        }
    }

    pub fn endpoint(&self, kind: OperationKind) -> String {
        self.inner.endpoint(kind)
    }
}

#[async_trait]
impl UpstreamAdapter for GeminiClient {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Gemini
    }

    fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    async fn chat_completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_json(OperationKind::ChatCompletion, body).await
    }

    async fn embeddings(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_json(OperationKind::Embeddings, body).await
    }

    async fn image_generations(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.inner.post_json(OperationKind::ImageGeneration, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::{MultipartForm, RelayOperation};

    fn client() -> GeminiClient {
        GeminiClient::with_client(
            Client::new(),
            "https://generativelanguage.googleapis.com".to_string(),
            "key".to_string(),
        )
    }

    #[test]
    fn test_gemini_endpoint() {
        assert_eq!(
            client().endpoint(OperationKind::ChatCompletion),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_gemini_rejects_audio() {
        let result = client()
            .dispatch(RelayOperation::Transcription(MultipartForm {
                model: "gemini-2.0-flash".to_string(),
                ..Default::default()
            }))
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Unsupported {
                kind: OperationKind::Transcription,
                channel_type: ChannelType::Gemini,
            })
        ));
    }
}
