use super::selector::select_weighted;
use chrono::{DateTime, TimeDelta, Utc};
use fennel_core::channel::{Channel, ChannelModel, NewChannel};
use fennel_core::config::model::BalanceSettings;
use fennel_core::store::{ChannelStore, StoreError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 选中的渠道模型
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelModelConf {
    pub model_record_id: i64,
    pub model_key: String,
    pub weight: i32,
    pub channel: Channel,
}

#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    #[error("no available channel for model '{model}'")]
    NoAvailable { model: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Default)]
struct BalancerState {
    channels: HashMap<i64, Channel>,
    model_mapping: HashMap<String, Vec<String>>,
}

/// 负载均衡器
///
/// 渠道快照和别名映射放在同一把读写锁下，锁不会跨越 await。
/// 分数的增减全部交给存储，以单次原子操作完成。
pub struct LoadBalancer {
    store: Arc<dyn ChannelStore>,
    state: RwLock<BalancerState>,
    settings: BalanceSettings,
}

impl LoadBalancer {
    /// 创建负载均衡器并立即加载渠道快照
    pub async fn new(
        store: Arc<dyn ChannelStore>,
        model_mapping: HashMap<String, Vec<String>>,
        settings: BalanceSettings,
    ) -> Result<Self, StoreError> {
        let balancer = Self {
            store,
            state: RwLock::new(BalancerState {
                channels: HashMap::new(),
                model_mapping,
            }),
            settings,
        };
        balancer.refresh_channels().await?;
        Ok(balancer)
    }

    pub fn settings(&self) -> &BalanceSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ChannelStore> {
        &self.store
    }

    /// 从存储整体重新加载渠道快照
    pub async fn refresh_channels(&self) -> Result<usize, StoreError> {
        let channels = self.store.list_channels().await?;
        let count = channels.len();
        self.state.write().channels = channels.into_iter().map(|c| (c.id, c)).collect();
        debug!("Loaded {} channels into snapshot", count);
        Ok(count)
    }

    pub fn upsert_channel(&self, channel: Channel) {
        self.state.write().channels.insert(channel.id, channel);
    }

    pub fn remove_channel(&self, id: i64) -> Option<Channel> {
        self.state.write().channels.remove(&id)
    }

    pub fn channel(&self, id: i64) -> Option<Channel> {
        self.state.read().channels.get(&id).cloned()
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.state.read().channels.values().cloned().collect();
        channels.sort_by_key(|c| c.id);
        channels
    }

    /// 注册渠道（按内容哈希幂等），并同步启用状态和快照
    pub async fn register_channel(&self, new_channel: NewChannel) -> Result<Channel, StoreError> {
        let desired = new_channel.status;
        let mut channel = self
            .store
            .create_channel(new_channel, self.settings.initial_weight)
            .await?;
        if channel.status != desired {
            self.store.set_channel_status(channel.id, desired).await?;
            channel.status = desired;
        }
        self.upsert_channel(channel.clone());
        Ok(channel)
    }

    /// 展开别名：字面 id 在前，随后按配置顺序追加别名，去重
    pub fn expand_model(&self, model_id: &str) -> Vec<String> {
        let mut keys = vec![model_id.to_string()];
        if let Some(aliases) = self.state.read().model_mapping.get(model_id) {
            for alias in aliases {
                if !keys.contains(alias) {
                    keys.push(alias.clone());
                }
            }
        }
        keys
    }

    /// 快照未命中时回源查询一次，命中后写回快照
    async fn resolve_channel(&self, channel_id: i64) -> Result<Option<Channel>, StoreError> {
        if let Some(channel) = self.channel(channel_id) {
            return Ok(Some(channel));
        }

        let fetched = self.store.get_channel(channel_id).await?;
        match &fetched {
            Some(channel) => {
                debug!("Channel {} missing from snapshot, loaded from store", channel_id);
                self.upsert_channel(channel.clone());
            }
            None => warn!("Channel {} referenced by a model row does not exist", channel_id),
        }
        Ok(fetched)
    }

    async fn join_channels(&self, rows: Vec<ChannelModel>) -> Result<Vec<ChannelModelConf>, StoreError> {
        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(channel) = self.resolve_channel(row.channel_id).await? else {
                continue;
            };
            if !channel.is_enabled() {
                debug!(
                    "Skipping model {} on disabled channel {}",
                    row.model_key, channel.id
                );
                continue;
            }
            candidates.push(ChannelModelConf {
                model_record_id: row.id,
                model_key: row.model_key,
                weight: row.weight,
                channel,
            });
        }
        Ok(candidates)
    }

    /// 为指定模型选择渠道
    pub async fn next_channel(&self, model_id: &str) -> Result<ChannelModelConf, BalanceError> {
        let keys = self.expand_model(model_id);
        let rows = self.store.find_usable_models(&keys).await?;
        let candidates = self.join_channels(rows).await?;

        let selected = {
            let mut rng = rand::rng();
            select_weighted(&candidates, |c| c.weight, &mut rng).cloned()
        };

        match selected {
            Some(conf) => {
                debug!(
                    "Selected channel {} ({}) model {} for '{}' out of {} candidates",
                    conf.channel.id,
                    conf.channel.name,
                    conf.model_key,
                    model_id,
                    candidates.len()
                );
                Ok(conf)
            }
            None => Err(BalanceError::NoAvailable {
                model: model_id.to_string(),
            }),
        }
    }

    /// 成功反馈
    pub async fn success_cb(&self, model_record_id: i64) -> Result<(), StoreError> {
        self.store
            .apply_success(model_record_id, &self.settings.score_limits())
            .await
    }

    /// 失败反馈
    pub async fn fail_cb(&self, model_record_id: i64) -> Result<(), StoreError> {
        self.store
            .apply_failure(model_record_id, &self.settings.score_limits())
            .await
    }

    /// 恢复挂起超过恢复窗口的渠道模型，返回恢复的行数
    pub async fn recover_channel_models(&self) -> Result<u64, StoreError> {
        let cutoff = recovery_cutoff(Utc::now(), self.settings.recovery_window_seconds);
        let recovered = self
            .store
            .recover_suspended(cutoff, &self.settings.recovery_reset())
            .await?;
        if recovered > 0 {
            info!("Recovered {} suspended channel models", recovered);
        }
        Ok(recovered)
    }

    pub fn change_model_mapping(&self, model_mapping: HashMap<String, Vec<String>>) {
        self.state.write().model_mapping = model_mapping;
    }

    pub fn get_model_mapping_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.read().model_mapping.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 主动探测的目标：硬限制可用的行，包括已挂起的
    pub async fn probe_targets(&self, model_id: &str) -> Result<Vec<ChannelModelConf>, StoreError> {
        let keys = self.expand_model(model_id);
        let rows = self.store.find_probe_models(&keys).await?;
        self.join_channels(rows).await
    }

    /// 启用渠道实际提供的模型键，排序去重
    pub async fn served_model_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for channel in self.channels().into_iter().filter(Channel::is_enabled) {
            for model in self.store.list_channel_models(channel.id).await? {
                if model.hard_limit.is_usable() {
                    keys.push(model.model_key);
                }
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

fn recovery_cutoff(now: DateTime<Utc>, window_seconds: u64) -> DateTime<Utc> {
    i64::try_from(window_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
