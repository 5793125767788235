use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// 渠道类型，决定使用哪个上游适配器
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelType {
    /// OpenAI兼容格式（默认）
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    /// Google Gemini 的 OpenAI 兼容端点
    #[serde(rename = "gemini")]
    Gemini,
    /// SiliconFlow
    #[serde(rename = "siliconflow")]
    SiliconFlow,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::OpenAI => "openai",
            ChannelType::Gemini => "gemini",
            ChannelType::SiliconFlow => "siliconflow",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel type: {0}")]
pub struct UnknownChannelType(pub String);

impl FromStr for ChannelType {
    type Err = UnknownChannelType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ChannelType::OpenAI),
            "gemini" => Ok(ChannelType::Gemini),
            "siliconflow" => Ok(ChannelType::SiliconFlow),
            other => Err(UnknownChannelType(other.to_string())),
        }
    }
}

/// 渠道生命周期状态
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    #[default]
    Enabled,
    Disabled,
}

impl ChannelStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            ChannelStatus::Enabled => 1,
            ChannelStatus::Disabled => 2,
        }
    }

    /// 未知取值按禁用处理
    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => ChannelStatus::Enabled,
            _ => ChannelStatus::Disabled,
        }
    }
}

/// 软/硬限制状态，1 = 可用，2 = 受限
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum LimitState {
    #[default]
    Usable = 1,
    Limited = 2,
}

impl LimitState {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => LimitState::Usable,
            _ => LimitState::Limited,
        }
    }

    pub fn is_usable(self) -> bool {
        self == LimitState::Usable
    }
}

/// 上游渠道
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub channel_type: ChannelType,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub content_hash: String,
    pub status: ChannelStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn is_enabled(&self) -> bool {
        self.status == ChannelStatus::Enabled
    }
}

/// 计算渠道内容哈希（类型 + 地址 + 密钥），用于幂等注册
pub fn content_hash(channel_type: ChannelType, base_url: &str, api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channel_type.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(base_url.trim_end_matches('/').as_bytes());
    hasher.update(b"\n");
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// 注册新渠道的请求
#[derive(Debug, Clone, PartialEq)]
pub struct NewChannel {
    pub name: String,
    pub channel_type: ChannelType,
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<String>,
    pub status: ChannelStatus,
}

impl NewChannel {
    pub fn content_hash(&self) -> String {
        content_hash(self.channel_type, &self.base_url, &self.api_key)
    }
}

/// 评分上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreLimits {
    pub max_error_count: i32,
    pub max_weight: i32,
}

/// 恢复时写回的分数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReset {
    pub error_count: i32,
    pub weight: i32,
}

/// 渠道下的单个模型及其健康分数
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelModel {
    pub id: i64,
    pub channel_id: i64,
    pub model_key: String,
    pub weight: i32,
    pub error_count: i32,
    pub soft_limit: LimitState,
    pub hard_limit: LimitState,
    pub last_check_time: DateTime<Utc>,
    pub total_count: i64,
}

impl ChannelModel {
    pub fn new(id: i64, channel_id: i64, model_key: impl Into<String>, initial_weight: i32) -> Self {
        Self {
            id,
            channel_id,
            model_key: model_key.into(),
            weight: initial_weight,
            error_count: 0,
            soft_limit: LimitState::Usable,
            hard_limit: LimitState::Usable,
            last_check_time: Utc::now(),
            total_count: 0,
        }
    }

    /// 软硬限制都可用时才参与选择
    pub fn is_usable(&self) -> bool {
        self.soft_limit.is_usable() && self.hard_limit.is_usable()
    }

    pub fn record_success(&mut self, limits: &ScoreLimits, now: DateTime<Utc>) {
        self.total_count += 1;
        self.error_count = (self.error_count - 1).max(0);
        self.weight = (self.weight + 1).min(limits.max_weight);
        self.soft_limit = LimitState::Usable;
        self.last_check_time = now;
    }

    pub fn record_failure(&mut self, limits: &ScoreLimits, now: DateTime<Utc>) {
        self.total_count += 1;
        // 用未截断的计数判断是否挂起
        self.soft_limit = if self.error_count + 1 > limits.max_error_count {
            LimitState::Limited
        } else {
            LimitState::Usable
        };
        self.error_count = (self.error_count + 1).min(limits.max_error_count);
        self.weight = (self.weight - 1).max(0);
        self.last_check_time = now;
    }

    /// 被挂起、未被运营禁用、且上次检查早于截止时间
    pub fn is_recoverable(&self, cutoff: DateTime<Utc>) -> bool {
        self.soft_limit == LimitState::Limited
            && self.hard_limit.is_usable()
            && self.last_check_time < cutoff
    }

    pub fn reset_for_recovery(&mut self, reset: &RecoveryReset, now: DateTime<Utc>) {
        self.error_count = reset.error_count;
        self.weight = reset.weight;
        self.soft_limit = LimitState::Usable;
        self.last_check_time = now;
    }
}
