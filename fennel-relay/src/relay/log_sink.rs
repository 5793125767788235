use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fennel_core::client::OperationKind;
use serde::Serialize;
use tracing::{info, warn};

/// 一次转发调用的最终结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayLogEntry {
    /// 调用方请求的模型
    pub model_id: String,
    /// 实际服务的模型键
    pub model_key: Option<String>,
    pub channel_id: Option<i64>,
    pub channel_name: Option<String>,
    pub kind: OperationKind,
    pub attempts: u32,
    pub success: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 请求日志落点，调用方不等待写入完成
#[async_trait]
pub trait RequestLogSink: Send + Sync {
    async fn record(&self, entry: RelayLogEntry);
}

/// 以结构化 tracing 事件输出
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

#[async_trait]
impl RequestLogSink for TracingLogSink {
    async fn record(&self, entry: RelayLogEntry) {
        if entry.success {
            info!(
                model_id = %entry.model_id,
                model_key = entry.model_key.as_deref().unwrap_or_default(),
                channel_id = entry.channel_id.unwrap_or_default(),
                channel_name = entry.channel_name.as_deref().unwrap_or_default(),
                kind = %entry.kind,
                attempts = entry.attempts,
                latency_ms = entry.latency_ms,
                "relay succeeded"
            );
        } else {
            warn!(
                model_id = %entry.model_id,
                kind = %entry.kind,
                attempts = entry.attempts,
                latency_ms = entry.latency_ms,
                error = entry.error.as_deref().unwrap_or_default(),
                "relay failed"
            );
        }
    }
}
