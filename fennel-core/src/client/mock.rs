//! 可编排的测试适配器
//!
//! 按渠道 id 预设响应，并记录每一次调用，供负载均衡和转发测试使用。

use super::traits::{AdapterFactory, UpstreamAdapter};
use super::types::{ClientError, OperationKind, RelayOperation, RequestBody, UpstreamResponse};
use crate::channel::{Channel, ChannelType};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// 单次调用的预设结果
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// 200，按块返回响应体
    Succeed(Vec<Bytes>),
    /// 上游返回错误状态
    Fail(u16),
    /// 渠道类型不支持该操作
    Unsupported,
    /// 永不返回
    Hang,
}

impl MockBehavior {
    pub fn ok(body: &'static str) -> Self {
        MockBehavior::Succeed(vec![Bytes::from_static(body.as_bytes())])
    }
}

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct MockCall {
    pub channel_id: i64,
    pub kind: OperationKind,
    pub model: Option<String>,
    pub operation: RelayOperation,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<i64, VecDeque<MockBehavior>>,
    defaults: HashMap<i64, MockBehavior>,
    broken: HashSet<i64>,
    calls: Vec<MockCall>,
}

/// 测试用适配器工厂
#[derive(Clone, Default)]
pub struct MockAdapterFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 该渠道的默认行为（未设置时为成功）
    pub fn set_default(&self, channel_id: i64, behavior: MockBehavior) {
        self.state.lock().defaults.insert(channel_id, behavior);
    }

    /// 按顺序消费的行为，用完后回落到默认行为
    pub fn script(&self, channel_id: i64, behaviors: Vec<MockBehavior>) {
        self.state
            .lock()
            .scripts
            .entry(channel_id)
            .or_default()
            .extend(behaviors);
    }

    /// 让该渠道的适配器构建失败
    pub fn break_channel(&self, channel_id: i64) {
        self.state.lock().broken.insert(channel_id);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    fn next_behavior(&self, call: MockCall) -> MockBehavior {
        let mut state = self.state.lock();
        let channel_id = call.channel_id;
        state.calls.push(call);
        if let Some(behavior) = state.scripts.get_mut(&channel_id).and_then(VecDeque::pop_front) {
            return behavior;
        }
        state
            .defaults
            .get(&channel_id)
            .cloned()
            .unwrap_or_else(|| MockBehavior::ok(r#"{"ok":true}"#))
    }
}

impl AdapterFactory for MockAdapterFactory {
    fn create(&self, channel: &Channel) -> Result<Arc<dyn UpstreamAdapter>, ClientError> {
        if self.state.lock().broken.contains(&channel.id) {
            return Err(ClientError::InvalidRequest(format!(
                "channel {} cannot be built",
                channel.id
            )));
        }
        Ok(Arc::new(MockAdapter {
            channel_id: channel.id,
            channel_type: channel.channel_type,
            base_url: channel.base_url.clone(),
            factory: self.clone(),
        }))
    }
}

pub struct MockAdapter {
    channel_id: i64,
    channel_type: ChannelType,
    base_url: String,
    factory: MockAdapterFactory,
}

#[async_trait]
impl UpstreamAdapter for MockAdapter {
    fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn chat_completions(&self, body: RequestBody) -> Result<UpstreamResponse, ClientError> {
        self.dispatch(RelayOperation::ChatCompletion(body)).await
    }

    async fn dispatch(&self, operation: RelayOperation) -> Result<UpstreamResponse, ClientError> {
        let kind = operation.kind();
        let call = MockCall {
            channel_id: self.channel_id,
            kind,
            model: operation.requested_model(),
            operation,
        };
        match self.factory.next_behavior(call) {
            MockBehavior::Succeed(chunks) => {
                let mut headers = HeaderMap::new();
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(UpstreamResponse {
                    status: StatusCode::OK,
                    headers,
                    body: stream::iter(chunks.into_iter().map(Ok)).boxed(),
                })
            }
            MockBehavior::Fail(code) => Err(ClientError::Upstream {
                status: StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY),
                body: format!("scripted failure from channel {}", self.channel_id),
            }),
            MockBehavior::Unsupported => Err(self.unsupported(kind)),
            MockBehavior::Hang => futures::future::pending().await,
        }
    }
}
