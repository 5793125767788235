use super::types::{
    ClientError, MultipartForm, OperationKind, RelayOperation, RequestBody, UpstreamResponse,
};
use crate::channel::{Channel, ChannelType};
use async_trait::async_trait;
use std::sync::Arc;

/// 上游适配器
///
/// 每种操作一个方法，未覆盖的操作默认返回 `ClientError::Unsupported`。
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    /// 获取渠道类型
    fn channel_type(&self) -> ChannelType;

    /// 获取base URL
    fn base_url(&self) -> &str;

    async fn chat_completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError>;

    async fn completions(&self, _body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        Err(self.unsupported(OperationKind::Completion))
    }

    async fn embeddings(&self, _body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        Err(self.unsupported(OperationKind::Embeddings))
    }

    async fn speech(&self, _body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        Err(self.unsupported(OperationKind::Speech))
    }

    async fn transcriptions(&self, _form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        Err(self.unsupported(OperationKind::Transcription))
    }

    async fn translations(&self, _form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        Err(self.unsupported(OperationKind::Translation))
    }

    async fn image_generations(
        &self,
        _body: RequestBody,
    ) -> Result<UpstreamResponse, ClientError> {
        Err(self.unsupported(OperationKind::ImageGeneration))
    }

    async fn image_edits(&self, _form: MultipartForm) -> Result<UpstreamResponse, ClientError> {
        Err(self.unsupported(OperationKind::ImageEdit))
    }

    async fn image_variations(
        &self,
        _form: MultipartForm,
    ) -> Result<UpstreamResponse, ClientError> {
        Err(self.unsupported(OperationKind::ImageVariation))
    }

    /// 按操作类型分发
    async fn dispatch(&self, operation: RelayOperation) -> Result<UpstreamResponse, ClientError> {
        match operation {
            RelayOperation::ChatCompletion(body) => self.chat_completions(body).await,
            RelayOperation::Completion(body) => self.completions(body).await,
            RelayOperation::Embeddings(body) => self.embeddings(body).await,
            RelayOperation::Speech(body) => self.speech(body).await,
            RelayOperation::Transcription(form) => self.transcriptions(form).await,
            RelayOperation::Translation(form) => self.translations(form).await,
            RelayOperation::ImageGeneration(body) => self.image_generations(body).await,
            RelayOperation::ImageEdit(form) => self.image_edits(form).await,
            RelayOperation::ImageVariation(form) => self.image_variations(form).await,
        }
    }

    fn unsupported(&self, kind: OperationKind) -> ClientError {
        ClientError::Unsupported {
            kind,
            channel_type: self.channel_type(),
        }
    }
}

/// 为选中的渠道构建适配器
pub trait AdapterFactory: Send + Sync {
    fn create(&self, channel: &Channel) -> Result<Arc<dyn UpstreamAdapter>, ClientError>;
}
