use crate::channel::{ChannelStatus, ChannelType, NewChannel, RecoveryReset, ScoreLimits};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// 模型别名映射：逻辑模型 -> 候选模型键
    #[serde(default)]
    pub model_mapping: HashMap<String, Vec<String>>,
    /// 配置中声明的渠道，启动时幂等注册到存储
    #[serde(default)]
    pub channels: HashMap<String, ChannelConfig>,
    #[serde(default)]
    pub settings: GlobalSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GlobalSettings {
    #[serde(default)]
    pub balance: BalanceSettings,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub health_check: HealthCheckSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// 负载均衡评分参数
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BalanceSettings {
    /// 错误计数上限，超过即挂起
    #[serde(default = "default_max_error_count")]
    pub max_error_count: i32,
    /// 权重上限
    #[serde(default = "default_max_weight")]
    pub max_weight: i32,
    /// 新模型的初始权重
    #[serde(default = "default_max_weight")]
    pub initial_weight: i32,
    /// 挂起多久之后允许恢复（秒）
    #[serde(default = "default_recovery_window")]
    pub recovery_window_seconds: u64,
    #[serde(default = "default_recovery_error_count")]
    pub recovery_error_count: i32,
    #[serde(default = "default_recovery_weight")]
    pub recovery_weight: i32,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            max_error_count: default_max_error_count(),
            max_weight: default_max_weight(),
            initial_weight: default_max_weight(),
            recovery_window_seconds: default_recovery_window(),
            recovery_error_count: default_recovery_error_count(),
            recovery_weight: default_recovery_weight(),
        }
    }
}

impl BalanceSettings {
    pub fn score_limits(&self) -> ScoreLimits {
        ScoreLimits {
            max_error_count: self.max_error_count,
            max_weight: self.max_weight,
        }
    }

    pub fn recovery_reset(&self) -> RecoveryReset {
        RecoveryReset {
            error_count: self.recovery_error_count,
            weight: self.recovery_weight,
        }
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_window_seconds)
    }
}

/// 转发参数
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelaySettings {
    /// 单次请求最多尝试的渠道数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 每次尝试等待响应头的超时（秒）
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// 评分反馈队列容量
    #[serde(default = "default_feedback_queue_capacity")]
    pub feedback_queue_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_seconds: default_attempt_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            feedback_queue_capacity: default_feedback_queue_capacity(),
        }
    }
}

impl RelaySettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// 后台健康检查参数
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HealthCheckSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 需要主动探测的模型
    #[serde(default)]
    pub watch_models: Vec<String>,
    #[serde(default = "default_probe_delay")]
    pub probe_delay_seconds: u64,
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_seconds: u64,
    #[serde(default = "default_idle_interval")]
    pub idle_interval_seconds: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    #[serde(default = "default_probe_prompt")]
    pub probe_prompt: String,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_models: Vec::new(),
            probe_delay_seconds: default_probe_delay(),
            cycle_interval_seconds: default_cycle_interval(),
            idle_interval_seconds: default_idle_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            probe_prompt: default_probe_prompt(),
        }
    }
}

impl HealthCheckSettings {
    pub fn probe_delay(&self) -> Duration {
        Duration::from_secs(self.probe_delay_seconds)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_seconds)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DatabaseSettings {
    /// 为空时使用内存存储
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_database_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_database_max_connections(),
            timeout_seconds: default_database_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub channel_type: ChannelType,
    pub base_url: String,
    pub api_key: String,
    pub models: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ChannelConfig {
    pub fn to_new_channel(&self) -> NewChannel {
        NewChannel {
            name: self.name.clone(),
            channel_type: self.channel_type,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
            models: self.models.clone(),
            status: if self.enabled {
                ChannelStatus::Enabled
            } else {
                ChannelStatus::Disabled
            },
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_error_count() -> i32 {
    6
}

fn default_max_weight() -> i32 {
    20
}

fn default_recovery_window() -> u64 {
    7200 // 2小时
}

fn default_recovery_error_count() -> i32 {
    3
}

fn default_recovery_weight() -> i32 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_feedback_queue_capacity() -> usize {
    1024
}

fn default_probe_delay() -> u64 {
    5
}

fn default_cycle_interval() -> u64 {
    3600 // 60分钟
}

fn default_idle_interval() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_probe_prompt() -> String {
    "hi".to_string()
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_database_timeout() -> u64 {
    30
}

impl Config {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        for (channel_id, channel) in &self.channels {
            self.validate_channel_config(channel_id, channel)?;
        }

        for (model_id, aliases) in &self.model_mapping {
            if model_id.trim().is_empty() {
                anyhow::bail!("Model mapping contains an empty model name");
            }
            if aliases.is_empty() {
                anyhow::bail!("Model mapping '{}' has no aliases", model_id);
            }
            if aliases.iter().any(|alias| alias.trim().is_empty()) {
                anyhow::bail!("Model mapping '{}' contains an empty alias", model_id);
            }
        }

        self.validate_balance_settings()?;
        self.validate_relay_settings()?;

        if self.settings.health_check.watch_models.iter().any(|m| m.trim().is_empty()) {
            anyhow::bail!("health_check.watch_models contains an empty model name");
        }

        Ok(())
    }

    fn validate_channel_config(&self, channel_id: &str, channel: &ChannelConfig) -> Result<()> {
        if channel.name.trim().is_empty() {
            anyhow::bail!("Channel '{}' has empty name", channel_id);
        }

        if channel.api_key.is_empty() {
            anyhow::bail!("Channel '{}' has empty api_key", channel_id);
        }

        if channel.models.is_empty() {
            anyhow::bail!("Channel '{}' has no models defined", channel_id);
        }

        if channel.models.iter().any(|m| m.trim().is_empty()) {
            anyhow::bail!("Channel '{}' has an empty model key", channel_id);
        }

        if !channel.base_url.starts_with("http://") && !channel.base_url.starts_with("https://") {
            anyhow::bail!(
                "Channel '{}' has invalid base_url format: '{}'. Must start with http:// or https://",
                channel_id,
                channel.base_url
            );
        }

        Ok(())
    }

    fn validate_balance_settings(&self) -> Result<()> {
        let balance = &self.settings.balance;

        if balance.max_error_count < 1 {
            anyhow::bail!("balance.max_error_count must be at least 1");
        }
        if balance.max_weight < 1 {
            anyhow::bail!("balance.max_weight must be at least 1");
        }
        if !(0..=balance.max_weight).contains(&balance.initial_weight) {
            anyhow::bail!(
                "balance.initial_weight must be within 0..={}",
                balance.max_weight
            );
        }
        if !(0..=balance.max_weight).contains(&balance.recovery_weight) {
            anyhow::bail!(
                "balance.recovery_weight must be within 0..={}",
                balance.max_weight
            );
        }
        if !(0..=balance.max_error_count).contains(&balance.recovery_error_count) {
            anyhow::bail!(
                "balance.recovery_error_count must be within 0..={}",
                balance.max_error_count
            );
        }

        Ok(())
    }

    fn validate_relay_settings(&self) -> Result<()> {
        let relay = &self.settings.relay;

        if relay.max_attempts == 0 {
            anyhow::bail!("relay.max_attempts cannot be 0");
        }
        if relay.attempt_timeout_seconds == 0 {
            anyhow::bail!("relay.attempt_timeout_seconds cannot be 0");
        }
        if relay.feedback_queue_capacity == 0 {
            anyhow::bail!("relay.feedback_queue_capacity cannot be 0");
        }

        Ok(())
    }

    /// 别名映射中出现的全部模型键，加上各渠道声明的模型
    pub fn known_model_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .model_mapping
            .iter()
            .flat_map(|(id, aliases)| std::iter::once(id).chain(aliases.iter()))
            .chain(self.channels.values().flat_map(|c| c.models.iter()))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}
