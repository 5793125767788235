use super::feedback::FeedbackQueue;
use super::log_sink::{RelayLogEntry, RequestLogSink};
use chrono::Utc;
use fennel_core::client::{
    AdapterFactory, BodyStream, ClientError, OperationKind, RelayOperation, UpstreamResponse,
};
use fennel_core::config::model::RelaySettings;
use fennel_loadbalance::{ChannelModelConf, LoadBalancer};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// 唯一的终止性服务错误
    #[error("no provider available, try again later")]
    AllAttemptsExhausted { model: String, attempts: u32 },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request cancelled by caller")]
    Cancelled,
}

/// 转发成功的响应，响应体未被读取
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
    pub channel_id: i64,
    pub model_key: String,
    pub attempts: u32,
}

impl fmt::Debug for RelayResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayResponse")
            .field("status", &self.status)
            .field("channel_id", &self.channel_id)
            .field("model_key", &self.model_key)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

enum AttemptOutcome {
    Served(UpstreamResponse),
    Failed(String),
    /// 渠道类型不支持该操作，不计入健康度
    Skipped(String),
    Cancelled,
}

/// 转发引擎
///
/// 每个请求最多尝试 `max_attempts` 个渠道，尝试之间严格串行。
pub struct RelayEngine {
    balancer: Arc<LoadBalancer>,
    feedback: FeedbackQueue,
    adapters: Arc<dyn AdapterFactory>,
    log_sink: Arc<dyn RequestLogSink>,
    settings: RelaySettings,
}

impl RelayEngine {
    pub fn new(
        balancer: Arc<LoadBalancer>,
        feedback: FeedbackQueue,
        adapters: Arc<dyn AdapterFactory>,
        log_sink: Arc<dyn RequestLogSink>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            balancer,
            feedback,
            adapters,
            log_sink,
            settings,
        }
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// 转发请求
    pub async fn relay(
        &self,
        operation: RelayOperation,
        model_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RelayResponse, RelayError> {
        let start_time = Instant::now();
        let kind = operation.kind();

        operation
            .validate()
            .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(self.cancelled(model_id, kind, attempt - 1, start_time));
            }

            let selected = match self.balancer.next_channel(model_id).await {
                Ok(selected) => selected,
                Err(e) => {
                    warn!(
                        "Channel selection failed for '{}' on attempt {}/{}: {}",
                        model_id, attempt, max_attempts, e
                    );
                    last_error = e.to_string();
                    continue;
                }
            };

            debug!(
                "Attempt {}/{} for '{}': channel {} ({}) model {}",
                attempt,
                max_attempts,
                model_id,
                selected.channel.id,
                selected.channel.name,
                selected.model_key
            );

            let request = operation
                .with_model(&selected.model_key)
                .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

            match self.attempt(request, &selected, cancel).await {
                AttemptOutcome::Served(response) => {
                    self.feedback.success(selected.model_record_id);
                    self.spawn_log(RelayLogEntry {
                        model_id: model_id.to_string(),
                        model_key: Some(selected.model_key.clone()),
                        channel_id: Some(selected.channel.id),
                        channel_name: Some(selected.channel.name.clone()),
                        kind,
                        attempts: attempt,
                        success: true,
                        latency_ms: elapsed_ms(start_time),
                        error: None,
                        created_at: Utc::now(),
                    });
                    info!(
                        "Relayed '{}' via channel {} model {} after {} attempt(s)",
                        model_id, selected.channel.id, selected.model_key, attempt
                    );
                    return Ok(RelayResponse {
                        status: response.status,
                        headers: response.headers,
                        body: response.body,
                        channel_id: selected.channel.id,
                        model_key: selected.model_key,
                        attempts: attempt,
                    });
                }
                AttemptOutcome::Failed(reason) => {
                    self.feedback.failure(selected.model_record_id);
                    warn!(
                        "Attempt {}/{} for '{}' failed on channel {}: {}",
                        attempt, max_attempts, model_id, selected.channel.id, reason
                    );
                    last_error = reason;
                }
                AttemptOutcome::Skipped(reason) => {
                    debug!(
                        "Attempt {}/{} for '{}' skipped channel {}: {}",
                        attempt, max_attempts, model_id, selected.channel.id, reason
                    );
                    last_error = reason;
                }
                AttemptOutcome::Cancelled => {
                    return Err(self.cancelled(model_id, kind, attempt, start_time));
                }
            }
        }

        error!(
            "All {} attempts failed for model '{}': {}",
            max_attempts, model_id, last_error
        );
        self.spawn_log(RelayLogEntry {
            model_id: model_id.to_string(),
            model_key: None,
            channel_id: None,
            channel_name: None,
            kind,
            attempts: max_attempts,
            success: false,
            latency_ms: elapsed_ms(start_time),
            error: Some(last_error),
            created_at: Utc::now(),
        });
        Err(RelayError::AllAttemptsExhausted {
            model: model_id.to_string(),
            attempts: max_attempts,
        })
    }

    /// 单次尝试：构建适配器并分发，等待响应头受超时约束，与取消信号竞争
    async fn attempt(
        &self,
        request: RelayOperation,
        selected: &ChannelModelConf,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let adapter = match self.adapters.create(&selected.channel) {
            Ok(adapter) => adapter,
            Err(e) => return AttemptOutcome::Failed(format!("failed to build client: {e}")),
        };

        let timeout = self.settings.attempt_timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => AttemptOutcome::Cancelled,
            result = tokio::time::timeout(timeout, adapter.dispatch(request)) => match result {
                Ok(Ok(response)) => AttemptOutcome::Served(response),
                Ok(Err(e @ ClientError::Unsupported { .. })) => AttemptOutcome::Skipped(e.to_string()),
                Ok(Err(e)) => AttemptOutcome::Failed(e.to_string()),
                Err(_) => AttemptOutcome::Failed(format!(
                    "timed out after {timeout:?} waiting for response headers"
                )),
            },
        }
    }

    fn cancelled(
        &self,
        model_id: &str,
        kind: OperationKind,
        attempts: u32,
        start_time: Instant,
    ) -> RelayError {
        info!("Relay for '{}' cancelled by caller", model_id);
        self.spawn_log(RelayLogEntry {
            model_id: model_id.to_string(),
            model_key: None,
            channel_id: None,
            channel_name: None,
            kind,
            attempts,
            success: false,
            latency_ms: elapsed_ms(start_time),
            error: Some(RelayError::Cancelled.to_string()),
            created_at: Utc::now(),
        });
        RelayError::Cancelled
    }

    fn spawn_log(&self, entry: RelayLogEntry) {
        let sink = self.log_sink.clone();
        tokio::spawn(async move {
            sink.record(entry).await;
        });
    }
}

fn elapsed_ms(start_time: Instant) -> u64 {
    u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
}
